//! Data models for the circulation engine

pub mod catalog_item;
pub mod circulation;
pub mod patron;
pub mod reservation;

// Re-export commonly used types
pub use catalog_item::{CatalogItem, CopyBucket, CopyTransaction, CopyTransfer, ItemStatus};
pub use circulation::{CirculationRecord, CirculationStatus, Fulfillment, ReturnCondition, ReturnReceipt};
pub use patron::{HoldReadyNotice, PatronEligibility};
pub use reservation::{Reservation, ReservationStatus, SweepReport};

use chrono::{DateTime, Duration, Utc};

use crate::error::{AppError, AppResult};

/// Longest loan or hold period accepted, in days
pub const MAX_PERIOD_DAYS: i64 = 3650;

/// Reject a loan or hold period outside `1..=MAX_PERIOD_DAYS`
pub fn check_period(name: &str, days: i64) -> AppResult<()> {
    if (1..=MAX_PERIOD_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "{} must be between 1 and {}",
            name, MAX_PERIOD_DAYS
        )))
    }
}

/// `start` plus a whole number of days, refusing anything out of range
pub(crate) fn days_after(start: DateTime<Utc>, days: i64) -> AppResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|period| start.checked_add_signed(period))
        .ok_or_else(|| AppError::Validation(format!("Period of {} days is out of range", days)))
}
