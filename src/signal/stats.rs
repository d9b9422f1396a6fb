//! Statistics over a window snapshot

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::inbound::GrpcSource;
use super::window::{WindowData, WindowSnapshot};

/// Share of one distinct value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueShare {
    pub value: i64,
    pub count: usize,
    pub percent: Decimal,
}

/// Share of one tag among all tagged entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagShare {
    pub tag: GrpcSource,
    pub count: usize,
    pub percent: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub count: usize,
    pub mean: Decimal,
    pub median: Decimal,
    pub min: i64,
    pub max: i64,
    /// Ascending by value
    pub distribution: Vec<ValueShare>,
    /// `None` when no tagged entries exist
    pub tags: Option<Vec<TagShare>>,
    pub oldest: DateTime<Utc>,
    pub newest: DateTime<Utc>,
}

/// Result of `compute`; callers skip dispatch on `NoData`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalStats {
    NoData,
    Report(StatsReport),
}

fn percent(count: usize, total: usize) -> Decimal {
    (Decimal::from(count) * dec!(100) / Decimal::from(total)).round_dp(2)
}

fn median(sorted: &[i64]) -> Decimal {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Decimal::from(sorted[mid])
    } else {
        ((Decimal::from(sorted[mid - 1]) + Decimal::from(sorted[mid])) / dec!(2)).round_dp(2)
    }
}

/// Compute mean, median and distributions for a snapshot
pub fn compute(snapshot: &WindowSnapshot) -> SignalStats {
    match snapshot {
        WindowSnapshot::Empty => SignalStats::NoData,
        WindowSnapshot::Data(data) if data.values.is_empty() => SignalStats::NoData,
        WindowSnapshot::Data(data) => SignalStats::Report(compute_data(data)),
    }
}

fn compute_data(data: &WindowData) -> StatsReport {
    let count = data.values.len();
    let sum: Decimal = data.values.iter().map(|v| Decimal::from(*v)).sum();
    let mean = (sum / Decimal::from(count)).round_dp(2);

    let mut sorted = data.values.clone();
    sorted.sort_unstable();

    let distribution = data
        .frequencies
        .iter()
        .map(|(value, n)| ValueShare {
            value: *value,
            count: *n,
            percent: percent(*n, count),
        })
        .collect();

    let tagged: usize = data.tag_counts.values().sum();
    let tags = (tagged > 0).then(|| {
        GrpcSource::ALL
            .iter()
            .map(|tag| {
                let n = data.tag_counts.get(tag).copied().unwrap_or(0);
                TagShare {
                    tag: *tag,
                    count: n,
                    percent: percent(n, tagged),
                }
            })
            .collect()
    });

    StatsReport {
        count,
        mean,
        median: median(&sorted),
        min: sorted[0],
        max: sorted[count - 1],
        distribution,
        tags,
        oldest: data.oldest,
        newest: data.newest,
    }
}
