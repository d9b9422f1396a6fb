//! Copy-trade target wallet check
//!
//! Alerts once per wallet when a copy-trade target's SOL plus wrapped SOL
//! falls below the configured threshold. Alerted wallets are appended to a
//! file so a restart does not alert them again.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::common::errors::{MonitorError, Result};
use crate::common::retry::{Sleeper, TokioSleeper};
use crate::common::traits::BalanceOracle;
use crate::common::types::Asset;
use crate::config::types::AppConfig;
use crate::dispatch::client::DispatchClient;
use crate::dispatch::messages::{colors, Embed, OutboundMessage};
use crate::supervisor::job::{Job, Schedule};

pub const JOB_NAME: &str = "empty-check";

/// Preset sections holding copy-trade tasks
pub const PRESET_SECTIONS: [&str; 2] = ["sol_sniper", "sol_copy_trade"];

/// Highest `copy_trade_walletN` key read from a task
pub const MAX_WALLET_SLOTS: usize = 30;

/// Spacing between the two balance queries of one wallet
const QUERY_SPACING: Duration = Duration::from_millis(200);

/// Distinct copy-trade wallets listed in a presets document, sorted
pub fn preset_wallets(presets: &Value) -> Vec<String> {
    let mut wallets = BTreeSet::new();
    for section in PRESET_SECTIONS {
        let Some(entries) = presets.get(section).and_then(Value::as_array) else {
            continue;
        };
        for task in entries.iter().filter_map(|e| e.get("task_input")) {
            for slot in 1..=MAX_WALLET_SLOTS {
                let key = format!("copy_trade_wallet{}", slot);
                if let Some(wallet) = task.get(&key).and_then(Value::as_str) {
                    let wallet = wallet.trim();
                    if !wallet.is_empty() {
                        wallets.insert(wallet.to_string());
                    }
                }
            }
        }
    }
    wallets.into_iter().collect()
}

pub async fn load_preset_wallets(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| MonitorError::NotFound(format!("presets {}: {}", path.display(), e)))?;
    let presets: Value = serde_json::from_str(&raw)?;
    Ok(preset_wallets(&presets))
}

/// Wallets alerted before, one per line; a missing file is an empty set
pub async fn load_alerted(path: &Path) -> Result<HashSet<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(err) => Err(err.into()),
    }
}

pub async fn append_alerted(path: &Path, wallet: &str) -> Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", wallet).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

pub fn render_empty_alert(
    wallet: &str,
    sol: Decimal,
    wsol: Decimal,
    threshold: Decimal,
    mention: &str,
) -> OutboundMessage {
    let embed = Embed::new("⚠️ Low Balance Alert")
        .color(colors::RED)
        .field("Wallet", wallet, false)
        .field("SOL", format!("{:.2}", sol), true)
        .field("WSOL", format!("{:.2}", wsol), true)
        .field("Total", format!("{:.2}", sol + wsol), true)
        .footer(format!("Balance below {} SOL threshold", threshold));
    let message = OutboundMessage::embed(embed);
    if mention.is_empty() {
        message
    } else {
        message.with_content(mention)
    }
}

/// Counts from one pass over the preset wallets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub wallets: usize,
    pub checked: usize,
    pub alerted: usize,
    pub failed: usize,
}

pub struct EmptyCheckJob {
    config: Arc<AppConfig>,
    client: DispatchClient,
    oracle: Arc<dyn BalanceOracle>,
    sleeper: Arc<dyn Sleeper>,
    alerted: Mutex<HashSet<String>>,
}

impl EmptyCheckJob {
    pub fn new(config: Arc<AppConfig>, client: DispatchClient, oracle: Arc<dyn BalanceOracle>) -> Self {
        Self {
            config,
            client,
            oracle,
            sleeper: Arc::new(TokioSleeper),
            alerted: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn alerted(&self) -> MutexGuard<'_, HashSet<String>> {
        match self.alerted.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn is_alerted(&self, wallet: &str) -> bool {
        self.alerted().contains(wallet)
    }

    async fn wallet_balance(&self, wallet: &str) -> Result<(Decimal, Decimal)> {
        let sol = self.oracle.balance(wallet, Asset::Sol).await?;
        self.sleeper.sleep(QUERY_SPACING).await;
        let wsol = self.oracle.balance(wallet, Asset::WrappedSol).await?;
        Ok((sol, wsol))
    }

    /// Check every preset wallet not yet alerted
    #[instrument(skip(self), fields(job = JOB_NAME))]
    pub async fn check_once(&self) -> Result<CheckSummary> {
        let settings = &self.config.empty_check;
        let target = self.config.require_empty_check_webhook()?;
        let mention = self.config.mention();
        let wallets = load_preset_wallets(&settings.presets_path).await?;

        let mut summary = CheckSummary {
            wallets: wallets.len(),
            ..Default::default()
        };
        for wallet in &wallets {
            if self.is_alerted(wallet) {
                continue;
            }
            let (sol, wsol) = match self.wallet_balance(wallet).await {
                Ok(balances) => balances,
                Err(err) => {
                    warn!(wallet = %wallet, error = %err, "Balance check failed");
                    summary.failed += 1;
                    continue;
                }
            };
            summary.checked += 1;
            let total = sol + wsol;
            if total >= settings.target_balance_threshold {
                continue;
            }

            let message = render_empty_alert(wallet, sol, wsol, settings.target_balance_threshold, &mention);
            if !self.client.send(target, &message).await.is_delivered() {
                continue;
            }
            info!(wallet = %wallet, total = %total, "Empty wallet alert sent");
            self.alerted().insert(wallet.clone());
            if let Err(err) = append_alerted(&settings.alerted_path, wallet).await {
                warn!(wallet = %wallet, error = %err, "Could not record alerted wallet");
            }
            summary.alerted += 1;
            self.sleeper
                .sleep(Duration::from_millis(settings.alert_delay_ms))
                .await;
        }
        debug!(
            wallets = summary.wallets,
            checked = summary.checked,
            alerted = summary.alerted,
            "Wallet check pass complete"
        );
        Ok(summary)
    }
}

#[async_trait]
impl Job for EmptyCheckJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn schedule(&self) -> Schedule {
        Schedule::poll_secs(self.config.empty_check.poll_interval_seconds.max(1))
    }

    async fn startup(&self) -> Result<()> {
        self.config.require_rpc_url()?;
        self.config.require_empty_check_webhook()?;
        let previous = load_alerted(&self.config.empty_check.alerted_path).await?;
        info!(job = JOB_NAME, previously_alerted = previous.len(), "Loaded alerted wallets");
        self.alerted().extend(previous);
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        self.check_once().await.map(|_| ())
    }
}
