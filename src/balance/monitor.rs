//! Operator wallet balance monitor
//!
//! Each cycle queries the botting and vault wallets, feeds the combined SOL
//! total into the day baseline, raises a throttled low-balance alert and keeps
//! the balance dashboard current.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::OnceCell;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::baseline::PnlBaseline;
use crate::common::errors::{MonitorError, Result};
use crate::common::retry::{Sleeper, TokioSleeper};
use crate::common::traits::{BalanceOracle, PriceFeed};
use crate::common::types::Asset;
use crate::config::types::AppConfig;
use crate::dispatch::client::DispatchClient;
use crate::dispatch::live::{LivePublisher, PublishOutcome, RolloverPolicy};
use crate::dispatch::messages::{colors, Embed, OutboundMessage};
use crate::supervisor::job::{Job, Schedule};

pub const JOB_NAME: &str = "balance";

/// Balances read in one cycle, in whole units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub bot_sol: Decimal,
    pub bot_wsol: Decimal,
    pub vault_sol: Decimal,
    pub vault_usdc: Decimal,
}

impl BalanceSnapshot {
    /// SOL-denominated total tracked by the baseline
    pub fn total_sol(&self) -> Decimal {
        self.bot_sol + self.bot_wsol + self.vault_sol
    }
}

/// What one monitor cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub snapshot: BalanceSnapshot,
    pub daily_pnl: Decimal,
    pub alerted: bool,
    pub dashboard: Option<PublishOutcome>,
}

#[derive(Debug, Default)]
struct MonitorState {
    baseline: PnlBaseline,
    last_alert: Option<DateTime<Utc>>,
    last_dashboard: Option<DateTime<Utc>>,
}

/// `$1,234.56`
pub fn format_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let text = format!("{:.2}", rounded.abs());
    let (whole, frac) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{}${}.{}", sign, grouped, frac)
}

/// Two decimals with an explicit sign
pub fn format_signed(amount: Decimal) -> String {
    if amount.is_sign_negative() && !amount.is_zero() {
        format!("{:.2}", amount)
    } else {
        format!("+{:.2}", amount.abs())
    }
}

fn usd_of(amount: Decimal, price: Option<Decimal>) -> String {
    match price {
        Some(price) => format!(" ({})", format_usd(amount * price)),
        None => String::new(),
    }
}

/// Low-balance alert for the botting wallet
pub fn render_alert(
    snapshot: &BalanceSnapshot,
    daily_pnl: Decimal,
    price: Option<Decimal>,
    mention: &str,
) -> OutboundMessage {
    let mut embed = Embed::new("⚠️ Low Balance Alert")
        .color(colors::RED)
        .description(format!("{} Warning: Balance is below threshold!", mention).trim_start().to_string())
        .field(
            "SOL",
            format!("{:.2} SOL{}", snapshot.bot_sol, usd_of(snapshot.bot_sol, price)),
            true,
        )
        .field(
            "WSOL",
            format!("{:.2} SOL{}", snapshot.bot_wsol, usd_of(snapshot.bot_wsol, price)),
            true,
        )
        .field(
            "Total",
            format!("{:.2} SOL{}", snapshot.total_sol(), usd_of(snapshot.total_sol(), price)),
            false,
        )
        .field(
            "Daily PnL",
            format!("{} SOL{}", format_signed(daily_pnl), usd_of(daily_pnl, price)),
            false,
        );
    if let Some(price) = price {
        embed = embed.field("SOL Price", format_usd(price), false);
    }
    OutboundMessage::embed(embed)
}

/// Balance and PnL dashboard; USD figures are omitted without a price
pub fn render_dashboard(
    snapshot: &BalanceSnapshot,
    daily_pnl: Decimal,
    price: Option<Decimal>,
    now: DateTime<Utc>,
) -> OutboundMessage {
    let bot_total = snapshot.bot_sol + snapshot.bot_wsol;
    let color = if daily_pnl >= Decimal::ZERO {
        colors::GREEN
    } else {
        colors::RED
    };

    let mut bot = format!(
        "SOL: {:.2}{}\nWSOL: {:.2}{}",
        snapshot.bot_sol,
        usd_of(snapshot.bot_sol, price),
        snapshot.bot_wsol,
        usd_of(snapshot.bot_wsol, price)
    );
    let mut vault = format!(
        "SOL: {:.2}{}\nUSDC: {:.2}",
        snapshot.vault_sol,
        usd_of(snapshot.vault_sol, price),
        snapshot.vault_usdc
    );
    let mut combined = format!("Total SOL: {:.2}", snapshot.total_sol());
    if let Some(price) = price {
        let bot_usd = bot_total * price;
        let vault_usd = snapshot.vault_sol * price + snapshot.vault_usdc;
        bot.push_str(&format!("\nTotal Value: {}", format_usd(bot_usd)));
        vault.push_str(&format!("\nTotal Value: {}", format_usd(vault_usd)));
        combined.push_str(&format!("\nTotal Value: {}", format_usd(bot_usd + vault_usd)));
    }

    let mut embed = Embed::new("Balance and PnL Update")
        .color(color)
        .field("BOT WALLET", bot, false)
        .field("VAULT WALLET", vault, false)
        .field("COMBINED", combined, false)
        .field(
            "DAILY PNL",
            format!("{} SOL{}", format_signed(daily_pnl), usd_of(daily_pnl, price)),
            false,
        );
    embed = match price {
        Some(price) => embed.field("SOL PRICE", format_usd(price), false),
        None => embed.field("SOL PRICE", "unavailable", false),
    };
    OutboundMessage::embed(embed.footer(format!("Updated at {} UTC", now.format("%Y-%m-%d %H:%M:%S"))))
}

pub struct BalanceJob {
    config: Arc<AppConfig>,
    client: DispatchClient,
    oracle: Arc<dyn BalanceOracle>,
    price: Option<Arc<dyn PriceFeed>>,
    sleeper: Arc<dyn Sleeper>,
    dashboard: OnceCell<LivePublisher>,
    state: Mutex<MonitorState>,
}

impl BalanceJob {
    pub fn new(config: Arc<AppConfig>, client: DispatchClient, oracle: Arc<dyn BalanceOracle>) -> Self {
        Self {
            config,
            client,
            oracle,
            price: None,
            sleeper: Arc::new(TokioSleeper),
            dashboard: OnceCell::new(),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn with_price_feed(mut self, price: Arc<dyn PriceFeed>) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn dashboard(&self) -> Result<&LivePublisher> {
        self.dashboard.get_or_try_init(|| {
            let webhook = self.config.require_balance_webhook()?;
            let policy = RolloverPolicy::from_config(&self.config.signal)?;
            Ok::<_, MonitorError>(LivePublisher::new(self.client.clone(), webhook, policy))
        })
    }

    /// Query all four balances, spaced by the configured delay
    async fn fetch(&self) -> Result<BalanceSnapshot> {
        let bot = self.config.require_botting_address()?;
        let vault = self.config.require_vault_address()?;
        let spacing = Duration::from_millis(self.config.balance.query_delay_ms);
        let queries = [
            (bot, Asset::Sol),
            (bot, Asset::WrappedSol),
            (vault, Asset::Sol),
            (vault, Asset::Usdc),
        ];

        let mut values = [Decimal::ZERO; 4];
        for (i, (wallet, asset)) in queries.iter().enumerate() {
            if i > 0 {
                self.sleeper.sleep(spacing).await;
            }
            values[i] = self.oracle.balance(wallet, *asset).await?;
        }
        Ok(BalanceSnapshot {
            bot_sol: values[0],
            bot_wsol: values[1],
            vault_sol: values[2],
            vault_usdc: values[3],
        })
    }

    async fn sol_price(&self) -> Option<Decimal> {
        let feed = self.price.as_ref()?;
        match feed.usd_price(Asset::Sol).await {
            Ok(price) => Some(price),
            Err(err) => {
                warn!(error = %err, "SOL price unavailable, omitting USD values");
                None
            }
        }
    }

    /// Run one monitor cycle as of `now`; a failed query skips the cycle
    #[instrument(skip(self), fields(job = JOB_NAME))]
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let snapshot = self.fetch().await?;
        let total = snapshot.total_sol();
        let balance = &self.config.balance;

        let (daily_pnl, alert_due, dashboard_due) = {
            let mut state = self.state();
            if state.baseline.update_at(total, now) {
                info!(starting_total = %total, "Daily PnL baseline reset");
            }
            let alert_every = ChronoDuration::seconds(balance.alert_interval_seconds as i64);
            let update_every = ChronoDuration::seconds(balance.update_interval_seconds as i64);
            let alert_due = total < balance.your_balance_threshold
                && state.last_alert.map_or(true, |at| now - at >= alert_every);
            let dashboard_due = state.last_dashboard.map_or(true, |at| now - at >= update_every);
            (state.baseline.daily_pnl(), alert_due, dashboard_due)
        };

        let price = if alert_due || dashboard_due {
            self.sol_price().await
        } else {
            None
        };

        let mut alerted = false;
        if alert_due {
            warn!(total = %total, threshold = %balance.your_balance_threshold, "Balance below threshold");
            let target = self.config.require_balance_alert_webhook()?;
            let message = render_alert(&snapshot, daily_pnl, price, &self.config.mention());
            alerted = self.client.send(target, &message).await.is_delivered();
            if alerted {
                self.state().last_alert = Some(now);
            }
        }

        let mut dashboard = None;
        if dashboard_due {
            let message = render_dashboard(&snapshot, daily_pnl, price, now);
            let outcome = self.dashboard()?.publish_at(&message, now).await;
            if outcome != PublishOutcome::Dropped {
                self.state().last_dashboard = Some(now);
            }
            dashboard = Some(outcome);
        }

        info!(
            bot_sol = %snapshot.bot_sol,
            bot_wsol = %snapshot.bot_wsol,
            vault_sol = %snapshot.vault_sol,
            vault_usdc = %snapshot.vault_usdc,
            total = %total,
            daily_pnl = %daily_pnl,
            "Balances updated"
        );
        Ok(CycleOutcome {
            snapshot,
            daily_pnl,
            alerted,
            dashboard,
        })
    }
}

#[async_trait]
impl Job for BalanceJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn schedule(&self) -> Schedule {
        Schedule::poll_secs(self.config.balance.poll_interval_seconds.max(1))
    }

    async fn startup(&self) -> Result<()> {
        self.config.require_rpc_url()?;
        self.config.require_botting_address()?;
        self.config.require_vault_address()?;
        self.config.require_balance_alert_webhook()?;
        self.dashboard()?;
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        self.run_cycle_at(Utc::now()).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::retry::{BackoffPolicy, RecordingSleeper};
    use crate::common::traits::{MockBalanceOracle, MockMessageSink, MockPriceFeed};
    use crate::common::types::MessageId;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.wallets.botting_address = Some("BOT".to_string());
        config.wallets.vault_address = Some("VAULT".to_string());
        config.wallets.mention_id = Some("42".to_string());
        config.webhooks.balance_update = Some("https://hook/balance".to_string());
        config.webhooks.balance_alert = Some("https://hook/alert".to_string());
        config.balance.your_balance_threshold = dec!(5);
        config
    }

    fn oracle(bot_sol: Decimal) -> MockBalanceOracle {
        let mut oracle = MockBalanceOracle::new();
        oracle.expect_balance().returning(move |wallet, asset| {
            Ok(match (wallet, asset) {
                ("BOT", Asset::Sol) => bot_sol,
                ("BOT", Asset::WrappedSol) => dec!(1),
                ("VAULT", Asset::Sol) => dec!(2),
                ("VAULT", Asset::Usdc) => dec!(100),
                _ => Decimal::ZERO,
            })
        });
        oracle
    }

    fn job(sink: MockMessageSink, oracle: MockBalanceOracle, sleeper: Arc<RecordingSleeper>) -> BalanceJob {
        let client = DispatchClient::new(Arc::new(sink), BackoffPolicy::default())
            .with_sleeper(sleeper.clone());
        BalanceJob::new(Arc::new(config()), client, Arc::new(oracle)).with_sleeper(sleeper)
    }

    #[test]
    fn test_usd_formatting() {
        assert_eq!(format_usd(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(format_usd(dec!(12)), "$12.00");
        assert_eq!(format_usd(dec!(-950.5)), "-$950.50");
        assert_eq!(format_signed(dec!(1.5)), "+1.50");
        assert_eq!(format_signed(dec!(-0.25)), "-0.25");
    }

    #[test]
    fn test_dashboard_without_price_omits_usd() {
        let snapshot = BalanceSnapshot {
            bot_sol: dec!(3),
            bot_wsol: dec!(1),
            vault_sol: dec!(2),
            vault_usdc: dec!(100),
        };
        let message = render_dashboard(&snapshot, dec!(-1), None, now());
        let embed = &message.embeds[0];
        assert_eq!(embed.color, Some(colors::RED));
        assert_eq!(embed.field_value("COMBINED"), Some("Total SOL: 6.00"));
        assert_eq!(embed.field_value("DAILY PNL"), Some("-1.00 SOL"));
        assert!(!embed.field_value("BOT WALLET").unwrap().contains('$'));
    }

    #[test]
    fn test_dashboard_with_price() {
        let snapshot = BalanceSnapshot {
            bot_sol: dec!(3),
            bot_wsol: dec!(1),
            vault_sol: dec!(2),
            vault_usdc: dec!(100),
        };
        let message = render_dashboard(&snapshot, dec!(0), Some(dec!(150)), now());
        let embed = &message.embeds[0];
        assert_eq!(embed.color, Some(colors::GREEN));
        assert_eq!(
            embed.field_value("COMBINED"),
            Some("Total SOL: 6.00\nTotal Value: $1,000.00")
        );
        assert_eq!(embed.field_value("SOL PRICE"), Some("$150.00"));
    }

    #[tokio::test]
    async fn test_cycle_queries_in_order_with_spacing() {
        let mut sink = MockMessageSink::new();
        sink.expect_create()
            .times(1)
            .withf(|target, _| target == "https://hook/balance")
            .returning(|_, _| Ok(MessageId::new("d1")));

        let sleeper = Arc::new(RecordingSleeper::new());
        let job = job(sink, oracle(dec!(3)), sleeper.clone());
        let outcome = job.run_cycle_at(now()).await.unwrap();

        assert_eq!(outcome.snapshot.total_sol(), dec!(6));
        assert_eq!(outcome.daily_pnl, Decimal::ZERO);
        assert!(!outcome.alerted);
        assert_eq!(outcome.dashboard, Some(PublishOutcome::Created(MessageId::new("d1"))));
        assert_eq!(sleeper.waits(), vec![Duration::from_millis(2000); 3]);
    }

    #[tokio::test]
    async fn test_low_balance_alert_is_throttled() {
        let mut sink = MockMessageSink::new();
        sink.expect_create()
            .withf(|target, msg| {
                target == "https://hook/alert"
                    && msg.embeds[0]
                        .description
                        .as_deref()
                        .map_or(false, |d| d.starts_with("<@42>"))
            })
            .times(2)
            .returning(|_, _| Ok(MessageId::new("a")));
        sink.expect_create()
            .withf(|target, _| target == "https://hook/balance")
            .times(1)
            .returning(|_, _| Ok(MessageId::new("d1")));
        sink.expect_edit().returning(|_, _, _| Ok(()));

        let job = job(sink, oracle(dec!(0.5)), Arc::new(RecordingSleeper::new()));
        assert!(job.run_cycle_at(now()).await.unwrap().alerted);
        assert!(!job
            .run_cycle_at(now() + ChronoDuration::seconds(20))
            .await
            .unwrap()
            .alerted);
        assert!(job
            .run_cycle_at(now() + ChronoDuration::seconds(600))
            .await
            .unwrap()
            .alerted);
    }

    #[tokio::test]
    async fn test_startup_requires_rpc_endpoint() {
        let job = BalanceJob::new(
            Arc::new(config()),
            DispatchClient::new(Arc::new(MockMessageSink::new()), BackoffPolicy::default()),
            Arc::new(crate::balance::oracle::ConfiguredOracle::new(Arc::new(config()))),
        );
        let err = job.startup().await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("oracle.rpc_url"));
    }

    #[tokio::test]
    async fn test_failed_query_skips_cycle() {
        let mut oracle = MockBalanceOracle::new();
        oracle.expect_balance().returning(|_, _| {
            Err(MonitorError::RetriesExhausted {
                attempts: 5,
                last_error: "timeout".to_string(),
            })
        });
        let mut sink = MockMessageSink::new();
        sink.expect_create().never();

        let job = job(sink, oracle, Arc::new(RecordingSleeper::new()));
        assert!(job.run_cycle_at(now()).await.is_err());
        assert_eq!(job.state().baseline.starting_total(), None);
    }

    #[tokio::test]
    async fn test_price_failure_does_not_fail_cycle() {
        let mut price = MockPriceFeed::new();
        price
            .expect_usd_price()
            .returning(|_| Err(MonitorError::InvalidResponse("down".to_string())));
        let mut sink = MockMessageSink::new();
        sink.expect_create()
            .withf(|_, msg| msg.embeds[0].field_value("SOL PRICE") == Some("unavailable"))
            .times(1)
            .returning(|_, _| Ok(MessageId::new("d1")));

        let job = job(sink, oracle(dec!(3)), Arc::new(RecordingSleeper::new()))
            .with_price_feed(Arc::new(price));
        let outcome = job.run_cycle_at(now()).await.unwrap();
        assert!(outcome.dashboard.is_some());
    }
}
