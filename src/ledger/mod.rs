//! Wallet performance analysis over the copy-trade session ledger

pub mod analyzer;
pub mod job;
pub mod loader;
pub mod report;
pub mod types;

pub use analyzer::{analyze, analyze_all, roi};
pub use job::{AnalysisRun, LedgerJob};
pub use loader::{LoadReport, SessionDirectory};
pub use types::{LedgerEntry, Timeframe, TimeframeResult, TokenPerformance, TradeAction, WalletPerformance};
