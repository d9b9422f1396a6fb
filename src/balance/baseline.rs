//! Day-bounded PnL baseline
//!
//! The first total seen on a UTC calendar day becomes that day's baseline.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

/// One recorded total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSample {
    pub timestamp: DateTime<Utc>,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PnlBaseline {
    day_key: Option<NaiveDate>,
    starting_total: Decimal,
    samples: Vec<BalanceSample>,
}

impl PnlBaseline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, total: Decimal) -> bool {
        self.update_at(total, Utc::now())
    }

    /// Record `total`; returns `true` when this update started a new day
    pub fn update_at(&mut self, total: Decimal, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        let reset = self.day_key.map_or(true, |day| today > day);
        if reset {
            self.day_key = Some(today);
            self.starting_total = total;
            self.samples.clear();
        }
        self.samples.push(BalanceSample {
            timestamp: now,
            total,
        });
        reset
    }

    /// Latest total minus the day's baseline; zero before the first update
    pub fn daily_pnl(&self) -> Decimal {
        match (self.day_key, self.samples.last()) {
            (Some(_), Some(last)) => last.total - self.starting_total,
            _ => Decimal::ZERO,
        }
    }

    pub fn day_key(&self) -> Option<NaiveDate> {
        self.day_key
    }

    pub fn starting_total(&self) -> Option<Decimal> {
        self.day_key.map(|_| self.starting_total)
    }

    /// Samples recorded since the last reset
    pub fn samples(&self) -> &[BalanceSample] {
        &self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    #[test]
    fn test_uninitialized_pnl_is_zero() {
        let baseline = PnlBaseline::new();
        assert_eq!(baseline.daily_pnl(), Decimal::ZERO);
        assert_eq!(baseline.starting_total(), None);
    }

    #[test]
    fn test_baseline_resets_once_per_day() {
        let day = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let mut baseline = PnlBaseline::new();

        assert!(baseline.update_at(dec!(100), day));
        assert_eq!(baseline.starting_total(), Some(dec!(100)));

        assert!(!baseline.update_at(dec!(104.5), day + Duration::hours(15)));
        assert_eq!(baseline.starting_total(), Some(dec!(100)));
        assert_eq!(baseline.daily_pnl(), dec!(4.5));
        assert_eq!(baseline.samples().len(), 2);

        assert!(baseline.update_at(dec!(97), day + Duration::hours(17)));
        assert_eq!(baseline.starting_total(), Some(dec!(97)));
        assert_eq!(baseline.daily_pnl(), Decimal::ZERO);
        assert_eq!(baseline.samples().len(), 1);
    }

    #[test]
    fn test_day_key_never_moves_backwards() {
        let day = Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap();
        let mut baseline = PnlBaseline::new();
        baseline.update_at(dec!(10), day);
        assert!(!baseline.update_at(dec!(12), day - Duration::hours(3)));
        assert_eq!(baseline.day_key(), Some(day.date_naive()));
        assert_eq!(baseline.daily_pnl(), dec!(2));
    }
}
