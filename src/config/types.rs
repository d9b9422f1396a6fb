//! Configuration types

use chrono::NaiveTime;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::errors::{MonitorError, Result};
use crate::common::retry::BackoffPolicy;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Balance oracle and price feed endpoints
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Operator wallets
    #[serde(default)]
    pub wallets: WalletsConfig,
    /// Outbound webhook targets
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    /// Chat platform access for reading the monitored channel
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub balance: BalanceConfig,
    #[serde(default)]
    pub analyser: AnalyserConfig,
    #[serde(default)]
    pub empty_check: EmptyCheckConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
}

/// JSON-RPC balance oracle and price feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// JSON-RPC endpoint
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Simple-price endpoint returning `{"solana":{"usd":..}}`
    #[serde(default = "default_price_url")]
    pub price_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            price_url: default_price_url(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_price_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Operator wallets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletsConfig {
    #[serde(default)]
    pub botting_address: Option<String>,
    #[serde(default)]
    pub vault_address: Option<String>,
    /// User id mentioned in alerts
    #[serde(default)]
    pub mention_id: Option<String>,
}

/// Webhook URLs per report stream
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub signal_stats: Option<String>,
    #[serde(default)]
    pub balance_update: Option<String>,
    /// Falls back to `balance_update` when unset
    #[serde(default)]
    pub balance_alert: Option<String>,
    #[serde(default)]
    pub analyser_single: Option<String>,
    #[serde(default)]
    pub analyser_csv: Option<String>,
    #[serde(default)]
    pub empty_check: Option<String>,
}

/// Bot access used to read channel history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Channel whose messages carry the signals
    #[serde(default)]
    pub monitor_channel_id: Option<String>,
    #[serde(default = "default_discord_api_url")]
    pub api_url: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            monitor_channel_id: None,
            api_url: default_discord_api_url(),
        }
    }
}

fn default_discord_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

/// Signal frequency report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
    /// Poll interval for new channel messages
    #[serde(default = "default_signal_poll")]
    pub poll_interval_seconds: u64,
    /// Daily time after which a fresh dashboard message is started, `HH:MM`
    #[serde(default = "default_rollover_time")]
    pub rollover_time: String,
    /// IANA zone of `rollover_time`
    #[serde(default = "default_rollover_timezone")]
    pub rollover_timezone: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            poll_interval_seconds: default_signal_poll(),
            rollover_time: default_rollover_time(),
            rollover_timezone: default_rollover_timezone(),
        }
    }
}

/// Longest observation window accepted from configuration (one year)
pub const MAX_WINDOW_HOURS: i64 = 24 * 366;

fn default_window_hours() -> u64 {
    24
}

fn default_signal_poll() -> u64 {
    60
}

fn default_rollover_time() -> String {
    "16:15".to_string()
}

fn default_rollover_timezone() -> String {
    "Europe/Berlin".to_string()
}

impl SignalConfig {
    /// Observation window length, capped at [`MAX_WINDOW_HOURS`]
    pub fn window(&self) -> chrono::Duration {
        let hours = i64::try_from(self.window_hours)
            .unwrap_or(MAX_WINDOW_HOURS)
            .min(MAX_WINDOW_HOURS);
        chrono::Duration::hours(hours)
    }

    /// Parse the rollover time and zone
    pub fn rollover(&self) -> Result<(NaiveTime, Tz)> {
        let time = NaiveTime::parse_from_str(&self.rollover_time, "%H:%M").map_err(|e| {
            MonitorError::Configuration(format!(
                "signal.rollover_time '{}': {}",
                self.rollover_time, e
            ))
        })?;
        let tz: Tz = self.rollover_timezone.parse().map_err(|e| {
            MonitorError::Configuration(format!(
                "signal.rollover_timezone '{}': {}",
                self.rollover_timezone, e
            ))
        })?;
        Ok((time, tz))
    }
}

/// Balance monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Delay between monitor cycles
    #[serde(default = "default_balance_poll")]
    pub poll_interval_seconds: u64,
    /// Minimum spacing of dashboard updates
    #[serde(default = "default_balance_update_interval")]
    pub update_interval_seconds: u64,
    /// Spacing between oracle queries within a cycle
    #[serde(default = "default_query_delay")]
    pub query_delay_ms: u64,
    /// Total (SOL) below which the low-balance alert fires
    #[serde(default)]
    pub your_balance_threshold: Decimal,
    /// Minimum spacing of repeated low-balance alerts
    #[serde(default = "default_alert_interval")]
    pub alert_interval_seconds: u64,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_balance_poll(),
            update_interval_seconds: default_balance_update_interval(),
            query_delay_ms: default_query_delay(),
            your_balance_threshold: Decimal::ZERO,
            alert_interval_seconds: default_alert_interval(),
        }
    }
}

fn default_balance_poll() -> u64 {
    20
}

fn default_balance_update_interval() -> u64 {
    600
}

fn default_query_delay() -> u64 {
    2000
}

fn default_alert_interval() -> u64 {
    600
}

/// Ledger performance report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyserConfig {
    /// Directory holding `ct-session-*.csv` files
    #[serde(default = "default_sessions_dir")]
    pub sessions_dir: PathBuf,
    #[serde(default = "default_analysis_interval")]
    pub interval_hours: u64,
    /// Run once immediately when the job starts
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            sessions_dir: default_sessions_dir(),
            interval_hours: default_analysis_interval(),
            run_on_start: true,
        }
    }
}

fn default_sessions_dir() -> PathBuf {
    PathBuf::from("sessions")
}

fn default_analysis_interval() -> u64 {
    4
}

fn default_true() -> bool {
    true
}

/// Copy-trade target wallet check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmptyCheckConfig {
    #[serde(default = "default_presets_path")]
    pub presets_path: PathBuf,
    /// Wallets already alerted, one per line
    #[serde(default = "default_alerted_path")]
    pub alerted_path: PathBuf,
    #[serde(default)]
    pub target_balance_threshold: Decimal,
    #[serde(default = "default_empty_poll")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_alert_delay")]
    pub alert_delay_ms: u64,
}

impl Default for EmptyCheckConfig {
    fn default() -> Self {
        Self {
            presets_path: default_presets_path(),
            alerted_path: default_alerted_path(),
            target_balance_threshold: Decimal::ZERO,
            poll_interval_seconds: default_empty_poll(),
            alert_delay_ms: default_alert_delay(),
        }
    }
}

fn default_presets_path() -> PathBuf {
    PathBuf::from("presets.json")
}

fn default_alerted_path() -> PathBuf {
    PathBuf::from("empty.txt")
}

fn default_empty_poll() -> u64 {
    15
}

fn default_alert_delay() -> u64 {
    1000
}

/// Outbound delivery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    /// Added on top of a server-advised rate-limit wait
    #[serde(default = "default_rate_limit_buffer")]
    pub rate_limit_buffer_ms: u64,
    /// Pause between messages of one batch
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            rate_limit_buffer_ms: default_rate_limit_buffer(),
            batch_delay_ms: default_batch_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    crate::common::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_max_backoff() -> u64 {
    60_000
}

fn default_rate_limit_buffer() -> u64 {
    100
}

fn default_batch_delay() -> u64 {
    1500
}

impl DispatchConfig {
    /// Backoff schedule shared by the dispatch client and the oracle
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}

/// Job supervision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_health_check")]
    pub health_check_interval_seconds: u64,
    /// Delay before the first restart of a failed job
    #[serde(default = "default_restart_delay")]
    pub restart_delay_seconds: u64,
    /// Cap for the doubling restart delay
    #[serde(default = "default_max_restart_delay")]
    pub max_restart_delay_seconds: u64,
    /// Consecutive startup failures reported as a configuration problem
    #[serde(default = "default_crash_loop_threshold")]
    pub crash_loop_threshold: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check(),
            restart_delay_seconds: default_restart_delay(),
            max_restart_delay_seconds: default_max_restart_delay(),
            crash_loop_threshold: default_crash_loop_threshold(),
        }
    }
}

fn default_health_check() -> u64 {
    30
}

fn default_restart_delay() -> u64 {
    5
}

fn default_max_restart_delay() -> u64 {
    300
}

fn default_crash_loop_threshold() -> u32 {
    3
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(MonitorError::Configuration(format!("missing {}", key))),
    }
}

fn require_url<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    let raw = require(value, key)?;
    url::Url::parse(raw)
        .map_err(|e| MonitorError::Configuration(format!("invalid {} ({}): {}", key, raw, e)))?;
    Ok(raw)
}

impl AppConfig {
    pub fn require_rpc_url(&self) -> Result<&str> {
        require_url(&self.oracle.rpc_url, "oracle.rpc_url")
    }

    pub fn require_botting_address(&self) -> Result<&str> {
        require(&self.wallets.botting_address, "wallets.botting_address")
    }

    pub fn require_vault_address(&self) -> Result<&str> {
        require(&self.wallets.vault_address, "wallets.vault_address")
    }

    pub fn require_bot_token(&self) -> Result<&str> {
        require(&self.discord.bot_token, "discord.bot_token")
    }

    pub fn require_monitor_channel(&self) -> Result<&str> {
        require(&self.discord.monitor_channel_id, "discord.monitor_channel_id")
    }

    pub fn require_signal_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.signal_stats, "webhooks.signal_stats")
    }

    pub fn require_balance_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.balance_update, "webhooks.balance_update")
    }

    /// Alert target, defaulting to the dashboard webhook
    pub fn require_balance_alert_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.balance_alert, "webhooks.balance_alert")
            .or_else(|_| self.require_balance_webhook())
    }

    pub fn require_analyser_single_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.analyser_single, "webhooks.analyser_single")
    }

    pub fn require_analyser_csv_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.analyser_csv, "webhooks.analyser_csv")
    }

    pub fn require_empty_check_webhook(&self) -> Result<&str> {
        require_url(&self.webhooks.empty_check, "webhooks.empty_check")
    }

    /// Mention prefix for alerts, empty when no id is configured
    pub fn mention(&self) -> String {
        self.wallets
            .mention_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| format!("<@{}>", id))
            .unwrap_or_default()
    }
}
