//! Session CSV ledger source
//!
//! Reads every `ct-session-*.csv` in a directory. Expected columns are
//! `Date, Token, Action, Invested, Received, Target Wallet`; missing numeric
//! columns read as 0 and missing text columns as "".

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::types::{LedgerEntry, TradeAction};
use crate::common::errors::{MonitorError, Result};
use crate::common::traits::LedgerSource;

pub const SESSION_PREFIX: &str = "ct-session-";
pub const SESSION_SUFFIX: &str = ".csv";

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Result of reading a session directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub entries: Vec<LedgerEntry>,
    pub files: usize,
    /// Rows dropped for an unparsable date or unknown action
    pub skipped_rows: usize,
}

/// Column positions found in a header row
#[derive(Debug, Clone, Copy, Default)]
struct Columns {
    date: Option<usize>,
    token: Option<usize>,
    action: Option<usize>,
    invested: Option<usize>,
    received: Option<usize>,
    wallet: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Self {
            date: find("Date"),
            token: find("Token"),
            action: find("Action"),
            invested: find("Invested"),
            received: find("Received"),
            wallet: find("Target Wallet"),
        }
    }
}

fn text<'a>(record: &'a csv::StringRecord, idx: Option<usize>) -> &'a str {
    idx.and_then(|i| record.get(i)).map(str::trim).unwrap_or("")
}

/// Decimal amount; blank or unparsable values read as 0
pub fn parse_amount(value: &str) -> Decimal {
    let value = value.trim();
    if value.is_empty() {
        return Decimal::ZERO;
    }
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .unwrap_or(Decimal::ZERO)
}

/// ISO-8601 timestamp normalized to UTC; naive values are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Parse one session file's contents
pub fn parse_session<R: std::io::Read>(reader: R) -> Result<(Vec<LedgerEntry>, usize)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let columns = Columns::from_headers(reader.headers()?);

    let mut entries = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                debug!(error = %err, "Skipping unreadable ledger row");
                skipped += 1;
                continue;
            }
        };
        let Some(timestamp) = parse_timestamp(text(&record, columns.date)) else {
            skipped += 1;
            continue;
        };
        let Some(action) = TradeAction::parse(text(&record, columns.action)) else {
            skipped += 1;
            continue;
        };
        entries.push(LedgerEntry {
            timestamp,
            token: text(&record, columns.token).to_string(),
            action,
            invested: parse_amount(text(&record, columns.invested)).max(Decimal::ZERO),
            received: parse_amount(text(&record, columns.received)).max(Decimal::ZERO),
            wallet: text(&record, columns.wallet).to_string(),
        });
    }
    Ok((entries, skipped))
}

/// Directory of session CSV files
#[derive(Debug, Clone)]
pub struct SessionDirectory {
    dir: PathBuf,
}

impl SessionDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn is_session_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with(SESSION_PREFIX) && n.ends_with(SESSION_SUFFIX))
    }

    /// Read all session files; unreadable files are logged and skipped
    pub fn load_blocking(&self) -> Result<LoadReport> {
        let listing = std::fs::read_dir(&self.dir).map_err(|e| {
            MonitorError::NotFound(format!("session directory {}: {}", self.dir.display(), e))
        })?;

        let mut paths: Vec<PathBuf> = listing
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| Self::is_session_file(p))
            .collect();
        paths.sort();

        let mut report = LoadReport::default();
        for path in paths {
            let parsed = std::fs::File::open(&path)
                .map_err(MonitorError::from)
                .and_then(parse_session);
            match parsed {
                Ok((entries, skipped)) => {
                    debug!(file = %path.display(), rows = entries.len(), skipped, "Loaded session file");
                    report.files += 1;
                    report.skipped_rows += skipped;
                    report.entries.extend(entries);
                }
                Err(err) => warn!(file = %path.display(), error = %err, "Skipping unreadable session file"),
            }
        }

        if report.skipped_rows > 0 {
            warn!(skipped = report.skipped_rows, "Dropped malformed ledger rows");
        }
        info!(
            files = report.files,
            entries = report.entries.len(),
            "Ledger loaded"
        );
        Ok(report)
    }
}

#[async_trait]
impl LedgerSource for SessionDirectory {
    async fn load(&self) -> Result<Vec<LedgerEntry>> {
        let this = self.clone();
        let report = tokio::task::spawn_blocking(move || this.load_blocking())
            .await
            .map_err(|e| MonitorError::Internal(format!("ledger load task failed: {}", e)))??;
        Ok(report.entries)
    }
}
