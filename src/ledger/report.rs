//! Wallet performance messages and the ranking CSV

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;

use super::types::{TimeframeResult, WalletPerformance};
use crate::common::errors::{MonitorError, Result};
use crate::common::types::short_wallet;
use crate::dispatch::messages::{colors, Attachment, Embed, OutboundMessage};

/// Colour and status marker for an ROI percentage
pub fn roi_band(roi: Option<Decimal>) -> (u32, &'static str) {
    let Some(roi) = roi else {
        return (colors::GRAY, "⚪");
    };
    if roi >= Decimal::from(20) {
        (colors::GREEN, "💰")
    } else if roi >= Decimal::from(5) {
        (colors::LIGHT_GREEN, "🟢")
    } else if roi >= Decimal::from(-5) {
        (colors::WHITE, "⚪")
    } else if roi >= Decimal::from(-20) {
        (colors::ORANGE, "🟡")
    } else {
        (colors::RED, "🔴")
    }
}

pub fn timeframe_emoji(name: &str) -> &'static str {
    match name {
        "4 Hours" => "⏰",
        "12 Hours" => "⏱️",
        "24 Hours" => "📅",
        "3 Days" => "📆",
        "7 Days" => "📊",
        "All Time" => "🏆",
        _ => "📈",
    }
}

fn format_roi(roi: Option<Decimal>) -> String {
    match roi {
        Some(roi) => format!("{:.1}%", roi),
        None => "n/a".to_string(),
    }
}

/// Wallets in report order: all-time PnL ranking first, then any wallet only
/// present in shorter timeframes
pub fn wallet_order(results: &[TimeframeResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut order = Vec::new();
    for result in results.iter().rev() {
        for row in &result.wallets {
            if seen.insert(row.wallet.as_str()) {
                order.push(row.wallet.clone());
            }
        }
    }
    order
}

fn timeframe_embed(result: &TimeframeResult, row: Option<&WalletPerformance>) -> Embed {
    let title = format!(
        "{} {}",
        timeframe_emoji(&result.timeframe.name),
        result.timeframe.name
    );
    let Some(row) = row else {
        return Embed::new(title)
            .description("⚠️ **NOT TRADED**")
            .color(colors::GRAY);
    };
    let (color, status) = roi_band(row.roi);
    Embed::new(title).color(color).description(format!(
        "PNL: **{:.3} SOL**\nTrades: {}\nWin Rate: {:.1}%\n{} **Avg ROI: {}**\nInvested: {:.3} SOL\nReceived: {:.3} SOL",
        row.total_pnl,
        row.total_trades,
        row.win_rate,
        status,
        format_roi(row.roi),
        row.invested,
        row.received,
    ))
}

/// One message per wallet: a header embed plus one embed per timeframe
pub fn wallet_message(wallet: &str, results: &[TimeframeResult], now: DateTime<Utc>) -> OutboundMessage {
    let rows: Vec<Option<&WalletPerformance>> = results.iter().map(|r| r.wallet(wallet)).collect();
    let all_time = results
        .iter()
        .zip(&rows)
        .find(|(r, _)| r.timeframe.window.is_none())
        .and_then(|(_, row)| *row);
    let first_seen = rows.iter().flatten().find_map(|row| row.first_seen);

    let mut description = format!(
        "[GMGN](https://gmgn.ai/sol/address/{w}) | [CIELO](https://app.cielo.finance/profile/{w}/pnl/tokens?timeframe=7d)",
        w = wallet
    );
    if let Some(first_seen) = first_seen {
        description.push_str(&format!("\nFirst Seen: <t:{}:R>", first_seen.timestamp()));
    }
    description.push_str(&format!("\nUpdated: <t:{}:R>", now.timestamp()));

    let (color, _) = roi_band(all_time.and_then(|row| row.roi));
    let header = Embed::new(format!("📊 {}", short_wallet(wallet)))
        .description(description)
        .color(color);

    results
        .iter()
        .zip(rows)
        .fold(OutboundMessage::embed(header), |message, (result, row)| {
            message.with_embed(timeframe_embed(result, row))
        })
}

/// Combined messages for every wallet, in report order
pub fn wallet_messages(results: &[TimeframeResult], now: DateTime<Utc>) -> Vec<OutboundMessage> {
    wallet_order(results)
        .iter()
        .map(|wallet| wallet_message(wallet, results, now))
        .collect()
}

fn push_columns(record: &mut Vec<String>, row: Option<&WalletPerformance>) {
    match row {
        Some(row) => {
            record.push(row.total_trades.to_string());
            record.push(row.win_rate.round_dp(2).to_string());
            record.push(row.roi.map(|r| r.round_dp(2).to_string()).unwrap_or_default());
            record.push(row.total_pnl.round_dp(6).to_string());
            record.push(row.invested.round_dp(6).to_string());
            record.push(row.received.round_dp(6).to_string());
        }
        None => record.extend(std::iter::repeat("0".to_string()).take(6)),
    }
}

/// Ranking of every wallet across timeframes, longest timeframe first
pub fn ranking_csv(results: &[TimeframeResult]) -> Result<Vec<u8>> {
    let ordered: Vec<&TimeframeResult> = results.iter().rev().collect();
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["Target_Wallet".to_string()];
    for result in &ordered {
        let prefix = result.timeframe.column_prefix();
        for column in ["trades", "win_rate", "roi", "pnl", "invested", "received"] {
            header.push(format!("{}_{}", prefix, column));
        }
    }
    writer.write_record(&header)?;

    for wallet in wallet_order(results) {
        let mut record = vec![wallet.clone()];
        for result in &ordered {
            push_columns(&mut record, result.wallet(&wallet));
        }
        writer.write_record(&record)?;
    }

    writer
        .into_inner()
        .map_err(|e| MonitorError::Internal(format!("ranking csv flush failed: {}", e)))
}

/// Ranking CSV wrapped as an upload
pub fn ranking_message(results: &[TimeframeResult], now: DateTime<Utc>) -> Result<OutboundMessage> {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let bytes = ranking_csv(results)?;
    Ok(OutboundMessage::text(format!(
        "📈 Wallet Rankings - All Timeframes - {}",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    ))
    .with_attachment(Attachment::csv(
        format!("wallet_ranking_all_timeframes_{}.csv", stamp),
        bytes,
    )))
}
