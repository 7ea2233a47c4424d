//! Overdue fine calculation

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::config::CirculationConfig;

/// Daily rate and ceiling applied to late returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    pub daily_rate: Decimal,
    pub cap: Decimal,
}

impl FinePolicy {
    pub fn fine_for(&self, due_date: DateTime<Utc>, return_date: DateTime<Utc>) -> Decimal {
        compute_fine(due_date, return_date, self.daily_rate, self.cap)
    }
}

impl From<&CirculationConfig> for FinePolicy {
    fn from(config: &CirculationConfig) -> Self {
        Self {
            daily_rate: config.daily_fine_rate,
            cap: config.fine_cap,
        }
    }
}

/// Whole days late, any started day counting as a full one
pub fn days_overdue(due_date: DateTime<Utc>, return_date: DateTime<Utc>) -> i64 {
    if return_date <= due_date {
        return 0;
    }
    let late = return_date - due_date;
    let whole_days = late.num_days();
    if late > Duration::days(whole_days) {
        whole_days + 1
    } else {
        whole_days
    }
}

/// Fine owed for returning at `return_date` a loan due at `due_date`
pub fn compute_fine(
    due_date: DateTime<Utc>,
    return_date: DateTime<Utc>,
    daily_rate: Decimal,
    cap: Decimal,
) -> Decimal {
    let days = days_overdue(due_date, return_date);
    if days == 0 {
        return Decimal::ZERO;
    }
    let amount = daily_rate
        .checked_mul(Decimal::from(days))
        .unwrap_or(Decimal::MAX);
    amount.min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn due() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn rate() -> Decimal {
        Decimal::new(50, 2)
    }

    fn cap() -> Decimal {
        Decimal::new(5000, 2)
    }

    #[test]
    fn test_no_fine_on_or_before_due_date() {
        assert_eq!(compute_fine(due(), due(), rate(), cap()), Decimal::ZERO);
        assert_eq!(
            compute_fine(due(), due() - Duration::days(3), rate(), cap()),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_partial_day_rounds_up() {
        assert_eq!(days_overdue(due(), due() + Duration::seconds(1)), 1);
        assert_eq!(days_overdue(due(), due() + Duration::hours(25)), 2);
        assert_eq!(
            compute_fine(due(), due() + Duration::minutes(90), rate(), cap()),
            Decimal::new(50, 2)
        );
    }

    #[test]
    fn test_exact_days() {
        assert_eq!(days_overdue(due(), due() + Duration::days(6)), 6);
        assert_eq!(
            compute_fine(due(), due() + Duration::days(6), rate(), cap()),
            Decimal::new(300, 2)
        );
    }

    #[test]
    fn test_capped() {
        let fine = compute_fine(due(), due() + Duration::days(365), rate(), cap());
        assert_eq!(fine, cap());
    }

    #[test]
    fn test_monotonic_and_bounded() {
        let mut previous = Decimal::ZERO;
        for hours in (0..24 * 200).step_by(7) {
            let fine = compute_fine(due(), due() + Duration::hours(hours), rate(), cap());
            assert!(fine >= previous);
            assert!(fine <= cap());
            previous = fine;
        }
    }

    #[test]
    fn test_policy_from_config() {
        let policy = FinePolicy::from(&CirculationConfig::default());
        assert_eq!(policy.daily_rate, rate());
        assert_eq!(policy.cap, cap());
    }
}
