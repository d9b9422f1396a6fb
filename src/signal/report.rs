//! Rendering of block-difference statistics

use chrono::{DateTime, Duration, Utc};

use super::stats::StatsReport;
use crate::dispatch::live::RolloverPolicy;
use crate::dispatch::messages::{colors, Embed, OutboundMessage};

pub const REPORT_TITLE: &str = "📊 Block Difference Statistics";

/// Build the statistics dashboard message
pub fn render_stats(
    report: &StatsReport,
    window: Duration,
    channel_label: &str,
    rollover: &RolloverPolicy,
    now: DateTime<Utc>,
) -> OutboundMessage {
    let period_start = (now - window).format("%Y-%m-%d %H:%M");
    let period_end = now.format("%Y-%m-%d %H:%M");

    let distribution: String = report
        .distribution
        .iter()
        .map(|share| {
            format!(
                "`{:2}` blocks: **{}** times ({:.2}%)\n",
                share.value, share.count, share.percent
            )
        })
        .collect();

    let mut embed = Embed::new(REPORT_TITLE)
        .color(colors::BLUE)
        .timestamp(now)
        .field(
            "📅 Time Period",
            format!("From {} UTC\nTo {} UTC", period_start, period_end),
            false,
        )
        .field(
            "📈 Key Metrics",
            format!(
                "Average: **{}** blocks\nMedian: **{}** blocks",
                report.mean, report.median
            ),
            false,
        )
        .field(
            "📊 Channel Distribution",
            format!("#{}: **{}**", channel_label, report.count),
            false,
        )
        .field("🔢 Block Difference Distribution", distribution, false);

    if let Some(tags) = &report.tags {
        let lines: String = tags
            .iter()
            .map(|t| format!("{}: **{}** ({:.2}%)\n", t.tag, t.count, t.percent))
            .collect();
        embed = embed.field("🔧 GRPC Distribution", lines, false);
    }

    embed = embed.footer(format!(
        "Stats auto-update every 24 hours at {}",
        rollover.describe()
    ));

    OutboundMessage::embed(embed)
}
