//! Per-wallet performance over rolling timeframes
//!
//! Wallet ROI is realized: computed from summed invested and received
//! amounts, never as the mean of per-token percentages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

use super::types::{
    LedgerEntry, Timeframe, TimeframeResult, TokenPerformance, TradeAction, WalletPerformance,
};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// `(received - invested) / invested * 100`, undefined when nothing was invested
pub fn roi(invested: Decimal, received: Decimal) -> Option<Decimal> {
    if invested > Decimal::ZERO {
        Some((received - invested) / invested * HUNDRED)
    } else {
        None
    }
}

/// Earliest entry per wallet across the whole ledger
pub fn first_seen(ledger: &[LedgerEntry]) -> HashMap<&str, DateTime<Utc>> {
    let mut seen: HashMap<&str, DateTime<Utc>> = HashMap::new();
    for entry in ledger {
        seen.entry(entry.wallet.as_str())
            .and_modify(|ts| *ts = (*ts).min(entry.timestamp))
            .or_insert(entry.timestamp);
    }
    seen
}

/// Group the entries into per-wallet token positions
fn positions<'a>(
    entries: impl Iterator<Item = &'a LedgerEntry>,
) -> BTreeMap<&'a str, BTreeMap<&'a str, TokenPerformance>> {
    let mut wallets: BTreeMap<&str, BTreeMap<&str, TokenPerformance>> = BTreeMap::new();
    for entry in entries {
        let position = wallets
            .entry(entry.wallet.as_str())
            .or_default()
            .entry(entry.token.as_str())
            .or_insert_with(|| TokenPerformance {
                token: entry.token.clone(),
                invested: Decimal::ZERO,
                received: Decimal::ZERO,
                roi: None,
            });
        match entry.action {
            TradeAction::Buy => position.invested += entry.invested,
            TradeAction::Sell => position.received += entry.received,
        }
    }
    for tokens in wallets.values_mut() {
        for position in tokens.values_mut() {
            position.roi = roi(position.invested, position.received);
        }
    }
    wallets
}

fn summarize(
    wallet: &str,
    tokens: &BTreeMap<&str, TokenPerformance>,
    first_seen: Option<DateTime<Utc>>,
) -> WalletPerformance {
    let invested: Decimal = tokens.values().map(|t| t.invested).sum();
    let received: Decimal = tokens.values().map(|t| t.received).sum();

    let defined: Vec<Decimal> = tokens.values().filter_map(|t| t.roi).collect();
    let win_rate = if defined.is_empty() {
        Decimal::ZERO
    } else {
        let wins = defined.iter().filter(|r| **r > Decimal::ZERO).count();
        Decimal::from(wins) / Decimal::from(defined.len()) * HUNDRED
    };

    WalletPerformance {
        wallet: wallet.to_string(),
        total_trades: tokens.len(),
        win_rate,
        roi: roi(invested, received),
        total_pnl: received - invested,
        invested,
        received,
        first_seen,
    }
}

/// Analyze one timeframe; rows are sorted by PnL descending
pub fn analyze(ledger: &[LedgerEntry], timeframe: &Timeframe, now: DateTime<Utc>) -> TimeframeResult {
    let first_seen = first_seen(ledger);
    analyze_with(ledger, timeframe, now, &first_seen)
}

fn analyze_with(
    ledger: &[LedgerEntry],
    timeframe: &Timeframe,
    now: DateTime<Utc>,
    first_seen: &HashMap<&str, DateTime<Utc>>,
) -> TimeframeResult {
    let grouped = positions(ledger.iter().filter(|e| timeframe.contains(e.timestamp, now)));
    let mut wallets: Vec<WalletPerformance> = grouped
        .iter()
        .map(|(wallet, tokens)| summarize(wallet, tokens, first_seen.get(wallet).copied()))
        .collect();
    wallets.sort_by(|a, b| b.total_pnl.cmp(&a.total_pnl));

    TimeframeResult {
        timeframe: timeframe.clone(),
        wallets,
    }
}

/// Analyze every timeframe in order, omitting those without any wallet
pub fn analyze_all(
    ledger: &[LedgerEntry],
    timeframes: &[Timeframe],
    now: DateTime<Utc>,
) -> Vec<TimeframeResult> {
    let first_seen = first_seen(ledger);
    timeframes
        .iter()
        .map(|tf| analyze_with(ledger, tf, now, &first_seen))
        .filter(|result| !result.wallets.is_empty())
        .collect()
}
