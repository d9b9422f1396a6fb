//! Ledger and performance result types

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of a ledger record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// Parse the action column; anything other than Buy/Sell is rejected
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            v if v.eq_ignore_ascii_case("buy") => Some(TradeAction::Buy),
            v if v.eq_ignore_ascii_case("sell") => Some(TradeAction::Sell),
            _ => None,
        }
    }
}

/// One buy or sell record from the external ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub token: String,
    pub action: TradeAction,
    pub invested: Decimal,
    pub received: Decimal,
    pub wallet: String,
}

/// Rolling window applied before analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub name: String,
    /// `None` means all time
    pub window: Option<Duration>,
}

impl Timeframe {
    pub fn hours(name: impl Into<String>, hours: i64) -> Self {
        Self {
            name: name.into(),
            window: Some(Duration::hours(hours)),
        }
    }

    pub fn all_time() -> Self {
        Self {
            name: "All Time".to_string(),
            window: None,
        }
    }

    /// Column prefix used in the ranking CSV, e.g. `4_Hours`
    pub fn column_prefix(&self) -> String {
        self.name.replace(' ', "_")
    }

    /// Whether an entry at `timestamp` falls inside this timeframe
    pub fn contains(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.window {
            Some(window) => timestamp >= now - window,
            None => true,
        }
    }

    /// 4 Hours, 12 Hours, 24 Hours, 3 Days, 7 Days, All Time
    pub fn defaults() -> Vec<Timeframe> {
        vec![
            Timeframe::hours("4 Hours", 4),
            Timeframe::hours("12 Hours", 12),
            Timeframe::hours("24 Hours", 24),
            Timeframe::hours("3 Days", 72),
            Timeframe::hours("7 Days", 168),
            Timeframe::all_time(),
        ]
    }
}

/// Realized performance of one token held by one wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPerformance {
    pub token: String,
    pub invested: Decimal,
    pub received: Decimal,
    /// Undefined when nothing was invested
    pub roi: Option<Decimal>,
}

/// Per-wallet metrics for one timeframe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalletPerformance {
    pub wallet: String,
    /// Distinct tokens traded
    pub total_trades: usize,
    pub win_rate: Decimal,
    /// Realized ROI over summed invested/received; undefined when nothing was invested
    pub roi: Option<Decimal>,
    pub total_pnl: Decimal,
    pub invested: Decimal,
    pub received: Decimal,
    pub first_seen: Option<DateTime<Utc>>,
}

/// Analysis of one timeframe, rows sorted by PnL descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeframeResult {
    pub timeframe: Timeframe,
    pub wallets: Vec<WalletPerformance>,
}

impl TimeframeResult {
    pub fn wallet(&self, wallet: &str) -> Option<&WalletPerformance> {
        self.wallets.iter().find(|w| w.wallet == wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_action_parsing() {
        assert_eq!(TradeAction::parse("Buy"), Some(TradeAction::Buy));
        assert_eq!(TradeAction::parse(" sell "), Some(TradeAction::Sell));
        assert_eq!(TradeAction::parse("Transfer"), None);
    }

    #[test]
    fn test_timeframe_boundary_is_inclusive() {
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap();
        let four_hours = Timeframe::hours("4 Hours", 4);
        assert!(four_hours.contains(now - Duration::hours(4), now));
        assert!(!four_hours.contains(now - Duration::hours(4) - Duration::seconds(1), now));
        assert!(Timeframe::all_time().contains(now - Duration::days(900), now));
    }

    #[test]
    fn test_default_order_and_prefixes() {
        let names: Vec<String> = Timeframe::defaults()
            .iter()
            .map(|t| t.column_prefix())
            .collect();
        assert_eq!(
            names,
            vec!["4_Hours", "12_Hours", "24_Hours", "3_Days", "7_Days", "All_Time"]
        );
    }
}
