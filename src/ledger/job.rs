//! Periodic ledger performance report

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::analyzer::analyze_all;
use super::report::{ranking_message, wallet_messages};
use super::types::Timeframe;
use crate::common::errors::Result;
use crate::common::traits::LedgerSource;
use crate::config::types::AppConfig;
use crate::dispatch::client::{BatchReport, DispatchClient};
use crate::supervisor::job::{Job, Schedule};

pub const JOB_NAME: &str = "ledger";

/// What one analysis run sent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisRun {
    pub entries: usize,
    pub timeframes: usize,
    pub wallets: BatchReport,
    pub ranking_sent: bool,
}

pub struct LedgerJob {
    config: Arc<AppConfig>,
    client: DispatchClient,
    source: Arc<dyn LedgerSource>,
    timeframes: Vec<Timeframe>,
}

impl LedgerJob {
    pub fn new(config: Arc<AppConfig>, client: DispatchClient, source: Arc<dyn LedgerSource>) -> Self {
        Self {
            config,
            client,
            source,
            timeframes: Timeframe::defaults(),
        }
    }

    pub fn with_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.timeframes = timeframes;
        self
    }

    /// Load, analyze and send both reports
    #[instrument(skip(self), fields(job = JOB_NAME))]
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<AnalysisRun> {
        let single = self.config.require_analyser_single_webhook()?;
        let csv = self.config.require_analyser_csv_webhook()?;

        let ledger = self.source.load().await?;
        let mut run = AnalysisRun {
            entries: ledger.len(),
            ..Default::default()
        };
        if ledger.is_empty() {
            warn!("No ledger entries found, skipping analysis");
            return Ok(run);
        }

        let results = analyze_all(&ledger, &self.timeframes, now);
        run.timeframes = results.len();
        if results.is_empty() {
            warn!("No wallet activity in any timeframe");
            return Ok(run);
        }

        let messages = wallet_messages(&results, now);
        info!(wallets = messages.len(), "Sending wallet performance reports");
        run.wallets = self.client.send_batch(single, &messages).await;

        let ranking = ranking_message(&results, now)?;
        run.ranking_sent = self.client.send(csv, &ranking).await.is_delivered();
        Ok(run)
    }
}

#[async_trait]
impl Job for LedgerJob {
    fn name(&self) -> &str {
        JOB_NAME
    }

    fn schedule(&self) -> Schedule {
        Schedule::Aligned {
            period: Duration::from_secs(self.config.analyser.interval_hours.max(1) * 3600),
            run_on_start: self.config.analyser.run_on_start,
        }
    }

    async fn startup(&self) -> Result<()> {
        self.config.require_analyser_single_webhook()?;
        self.config.require_analyser_csv_webhook()?;
        info!(
            job = JOB_NAME,
            interval_hours = self.config.analyser.interval_hours,
            "Ledger analysis scheduled"
        );
        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        let run = self.run_at(Utc::now()).await?;
        info!(
            job = JOB_NAME,
            entries = run.entries,
            timeframes = run.timeframes,
            delivered = run.wallets.delivered,
            dropped = run.wallets.dropped,
            ranking_sent = run.ranking_sent,
            "Analysis complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::retry::{BackoffPolicy, RecordingSleeper};
    use crate::common::traits::{MockLedgerSource, MockMessageSink};
    use crate::common::types::MessageId;
    use crate::ledger::types::{LedgerEntry, TradeAction};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.webhooks.analyser_single = Some("https://hook/single".to_string());
        config.webhooks.analyser_csv = Some("https://hook/csv".to_string());
        config
    }

    fn job(sink: MockMessageSink, source: MockLedgerSource, sleeper: Arc<RecordingSleeper>) -> LedgerJob {
        let client = DispatchClient::new(Arc::new(sink), BackoffPolicy::default())
            .with_sleeper(sleeper)
            .with_batch_delay(std::time::Duration::from_millis(1500));
        LedgerJob::new(Arc::new(config()), client, Arc::new(source))
    }

    fn entry(wallet: &str, action: TradeAction, invested: Decimal, received: Decimal) -> LedgerEntry {
        LedgerEntry {
            timestamp: now() - ChronoDuration::hours(1),
            token: "TOKEN".to_string(),
            action,
            invested,
            received,
            wallet: wallet.to_string(),
        }
    }

    #[test]
    fn test_schedule_is_aligned() {
        let job = job(
            MockMessageSink::new(),
            MockLedgerSource::new(),
            Arc::new(RecordingSleeper::new()),
        );
        assert_eq!(
            job.schedule(),
            Schedule::Aligned {
                period: Duration::from_secs(4 * 3600),
                run_on_start: true
            }
        );
    }

    #[tokio::test]
    async fn test_startup_requires_both_webhooks() {
        let mut config = config();
        config.webhooks.analyser_csv = None;
        let client = DispatchClient::new(Arc::new(MockMessageSink::new()), BackoffPolicy::default());
        let job = LedgerJob::new(Arc::new(config), client, Arc::new(MockLedgerSource::new()));
        assert!(job.startup().await.unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn test_empty_ledger_sends_nothing() {
        let mut source = MockLedgerSource::new();
        source.expect_load().returning(|| Ok(vec![]));
        let mut sink = MockMessageSink::new();
        sink.expect_create().never();

        let run = job(sink, source, Arc::new(RecordingSleeper::new()))
            .run_at(now())
            .await
            .unwrap();
        assert_eq!(run.entries, 0);
        assert!(!run.ranking_sent);
    }

    #[tokio::test]
    async fn test_run_sends_wallet_batch_then_ranking() {
        let mut source = MockLedgerSource::new();
        source.expect_load().returning(|| {
            Ok(vec![
                entry("W1", TradeAction::Buy, dec!(1), dec!(0)),
                entry("W1", TradeAction::Sell, dec!(0), dec!(2)),
                entry("W2", TradeAction::Buy, dec!(1), dec!(0)),
            ])
        });

        let mut sink = MockMessageSink::new();
        sink.expect_create()
            .withf(|target, msg| target == "https://hook/single" && msg.embeds.len() == 7)
            .times(2)
            .returning(|_, _| Ok(MessageId::new("1")));
        sink.expect_create()
            .withf(|target, msg| target == "https://hook/csv" && msg.attachment.is_some())
            .times(1)
            .returning(|_, _| Ok(MessageId::new("2")));

        let sleeper = Arc::new(RecordingSleeper::new());
        let run = job(sink, source, sleeper.clone()).run_at(now()).await.unwrap();

        assert_eq!(run.timeframes, 6);
        assert_eq!(run.wallets.delivered, 2);
        assert!(run.ranking_sent);
        assert_eq!(sleeper.waits(), vec![std::time::Duration::from_millis(1500)]);
    }
}
