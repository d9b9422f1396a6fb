//! Wallet balance monitoring
//!
//! - `oracle` / `price`: JSON-RPC balances and USD price
//! - `baseline`: day-bounded PnL baseline
//! - `monitor`: operator wallet dashboard and low-balance alert
//! - `empty_check`: one-off alerts for drained copy-trade targets

pub mod baseline;
pub mod empty_check;
pub mod monitor;
pub mod oracle;
pub mod price;

pub use baseline::{BalanceSample, PnlBaseline};
pub use empty_check::{CheckSummary, EmptyCheckJob};
pub use monitor::{BalanceJob, BalanceSnapshot, CycleOutcome};
pub use oracle::{ConfiguredOracle, RpcBalanceOracle};
pub use price::CoinGeckoPriceFeed;
