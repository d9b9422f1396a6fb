//! Unified types shared across pipelines

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Mint address of wrapped SOL
pub const WRAPPED_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Mint address of USDC
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Asset whose balance can be queried from the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Sol,
    WrappedSol,
    Usdc,
}

impl Asset {
    /// Token mint for SPL assets, `None` for native SOL
    pub fn mint(&self) -> Option<&'static str> {
        match self {
            Asset::Sol => None,
            Asset::WrappedSol => Some(WRAPPED_SOL_MINT),
            Asset::Usdc => Some(USDC_MINT),
        }
    }

    /// Divisor turning integer base units into whole units
    pub fn divisor(&self) -> Decimal {
        match self {
            Asset::Sol | Asset::WrappedSol => dec!(1000000000),
            Asset::Usdc => dec!(1000000),
        }
    }

    /// Convert an amount in base units to whole units
    pub fn from_base_units(&self, amount: u64) -> Decimal {
        Decimal::from(amount) / self.divisor()
    }
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Sol => write!(f, "SOL"),
            Asset::WrappedSol => write!(f, "WSOL"),
            Asset::Usdc => write!(f, "USDC"),
        }
    }
}

/// Identifier of a message created on the messaging endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shorten a wallet address to `abcdef...uvwxyz`
pub fn short_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() <= 12 {
        return wallet.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 6..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_unit_conversion() {
        assert_eq!(Asset::Sol.from_base_units(1_500_000_000), dec!(1.5));
        assert_eq!(Asset::Usdc.from_base_units(2_250_000), dec!(2.25));
        assert_eq!(Asset::WrappedSol.from_base_units(0), Decimal::ZERO);
    }

    #[test]
    fn test_mints() {
        assert!(Asset::Sol.mint().is_none());
        assert_eq!(Asset::WrappedSol.mint(), Some(WRAPPED_SOL_MINT));
        assert_eq!(Asset::Usdc.mint(), Some(USDC_MINT));
    }

    #[test]
    fn test_short_wallet() {
        assert_eq!(
            short_wallet("7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU"),
            "7xKXtg...osgAsU"
        );
        assert_eq!(short_wallet("short"), "short");
    }
}
