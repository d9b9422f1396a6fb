//! CoinGecko simple-price feed

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::instrument;

use crate::common::errors::{MonitorError, Result};
use crate::common::traits::PriceFeed;
use crate::common::types::Asset;

/// Coin id understood by the price endpoint
fn coin_id(asset: Asset) -> &'static str {
    match asset {
        Asset::Sol | Asset::WrappedSol => "solana",
        Asset::Usdc => "usd-coin",
    }
}

#[derive(Debug, Clone)]
pub struct CoinGeckoPriceFeed {
    client: Client,
    url: String,
}

impl CoinGeckoPriceFeed {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for CoinGeckoPriceFeed {
    #[instrument(skip(self))]
    async fn usd_price(&self, asset: Asset) -> Result<Decimal> {
        let id = coin_id(asset);
        let response = self
            .client
            .get(&self.url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::InvalidResponse(format!(
                "price feed returned status {}",
                status
            )));
        }

        let body: Value = response.json().await?;
        let price = body
            .get(id)
            .and_then(|coin| coin.get("usd"))
            .ok_or_else(|| MonitorError::InvalidResponse(format!("no usd price for {}", id)))?;
        // the number's own text keeps its precision
        let text = price.to_string();
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| MonitorError::InvalidResponse(format!("bad price {}: {}", price, e)))
    }
}
