//! JSON-RPC balance oracle
//!
//! Native SOL comes from `getBalance`; SPL balances from
//! `getTokenAccountsByOwner` filtered by mint. Failed calls are retried with
//! the shared backoff policy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::common::errors::{MonitorError, Result};
use crate::common::retry::{BackoffPolicy, Sleeper, TokioSleeper, DEFAULT_RATE_LIMIT_BUFFER};
use crate::common::traits::BalanceOracle;
use crate::common::types::Asset;
use crate::config::types::AppConfig;

const TOKEN_AMOUNT_POINTER: &str = "/account/data/parsed/info/tokenAmount/amount";

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Balance oracle backed by a Solana JSON-RPC endpoint
pub struct RpcBalanceOracle {
    client: Client,
    url: String,
    policy: BackoffPolicy,
    rate_limit_buffer: Duration,
    sleeper: Arc<dyn Sleeper>,
    next_id: AtomicU64,
}

impl RpcBalanceOracle {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::Internal(e.to_string()))?;

        Ok(Self {
            client,
            url: url.to_string(),
            policy: BackoffPolicy::default(),
            rate_limit_buffer: DEFAULT_RATE_LIMIT_BUFFER,
            sleeper: Arc::new(TokioSleeper),
            next_id: AtomicU64::new(1),
        })
    }

    /// Oracle for `oracle.rpc_url`, using the dispatch backoff settings
    ///
    /// # Errors
    ///
    /// `MonitorError::Configuration` when the URL is missing or malformed.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let url = config.require_rpc_url()?;
        let timeout = Duration::from_secs(config.oracle.request_timeout_seconds);
        Ok(Self::with_timeout(url, timeout)?
            .with_policy(config.dispatch.backoff())
            .with_rate_limit_buffer(Duration::from_millis(config.dispatch.rate_limit_buffer_ms)))
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_rate_limit_buffer(mut self, buffer: Duration) -> Self {
        self.rate_limit_buffer = buffer;
        self
    }

    /// Wait before the next attempt: the server's advice when it gave one,
    /// otherwise the backoff schedule
    fn retry_wait(&self, err: &MonitorError, attempts: u32) -> Duration {
        match err {
            MonitorError::RateLimit {
                retry_after_ms: Some(ms),
                ..
            } => Duration::from_millis(*ms) + self.rate_limit_buffer,
            _ => self.policy.delay_for(attempts - 1),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// One JSON-RPC call, returning the `result` member
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(MonitorError::RateLimit {
                message: format!("{} rate limited", method),
                retry_after_ms,
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MonitorError::InvalidResponse(format!(
                "Server returned status {}: {}",
                status, body
            )));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(MonitorError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| MonitorError::InvalidResponse(format!("{} returned no result", method)))
    }

    async fn query(&self, wallet: &str, asset: Asset) -> Result<Decimal> {
        match asset.mint() {
            None => {
                let result = self.call("getBalance", json!([wallet])).await?;
                let lamports = result
                    .get("value")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| MonitorError::InvalidResponse("getBalance value missing".to_string()))?;
                Ok(asset.from_base_units(lamports))
            }
            Some(mint) => {
                let result = self
                    .call(
                        "getTokenAccountsByOwner",
                        json!([wallet, {"mint": mint}, {"encoding": "jsonParsed"}]),
                    )
                    .await?;
                let accounts = result
                    .get("value")
                    .and_then(Value::as_array)
                    .ok_or_else(|| {
                        MonitorError::InvalidResponse("getTokenAccountsByOwner value missing".to_string())
                    })?;
                let Some(first) = accounts.first() else {
                    return Ok(Decimal::ZERO);
                };
                let amount = first
                    .pointer(TOKEN_AMOUNT_POINTER)
                    .and_then(Value::as_str)
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .ok_or_else(|| MonitorError::InvalidResponse("token amount missing".to_string()))?;
                Ok(asset.from_base_units(amount))
            }
        }
    }
}

#[async_trait]
impl BalanceOracle for RpcBalanceOracle {
    #[instrument(skip(self))]
    async fn balance(&self, wallet: &str, asset: Asset) -> Result<Decimal> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.query(wallet, asset).await {
                Ok(balance) => {
                    debug!(%asset, %balance, attempts, "Balance fetched");
                    return Ok(balance);
                }
                Err(err) => err,
            };
            if !err.is_transient() {
                return Err(err);
            }
            if !self.policy.has_attempts_left(attempts) {
                return Err(MonitorError::RetriesExhausted {
                    attempts,
                    last_error: err.to_string(),
                });
            }
            let wait = self.retry_wait(&err, attempts);
            warn!(
                %asset,
                attempt = attempts,
                wait_ms = wait.as_millis() as u64,
                error = %err,
                "Balance query failed, retrying"
            );
            self.sleeper.sleep(wait).await;
        }
    }
}

/// RPC oracle built from configuration on first use
///
/// Jobs can be registered before the endpoint is known to be valid; a missing
/// `oracle.rpc_url` then surfaces as a configuration error from the job's
/// startup or first query instead of at process start.
pub struct ConfiguredOracle {
    config: Arc<AppConfig>,
    inner: OnceCell<RpcBalanceOracle>,
}

impl ConfiguredOracle {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            inner: OnceCell::new(),
        }
    }

    fn oracle(&self) -> Result<&RpcBalanceOracle> {
        self.inner
            .get_or_try_init(|| RpcBalanceOracle::from_config(&self.config))
    }
}

#[async_trait]
impl BalanceOracle for ConfiguredOracle {
    async fn balance(&self, wallet: &str, asset: Asset) -> Result<Decimal> {
        self.oracle()?.balance(wallet, asset).await
    }
}
