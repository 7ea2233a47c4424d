//! Reservation (hold) model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;

/// Reservation status. Only ACTIVE can transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ReservationStatus {
    Active = 0,
    Completed = 1,
    Cancelled = 2,
    Expired = 3,
}

impl From<i16> for ReservationStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => ReservationStatus::Completed,
            2 => ReservationStatus::Cancelled,
            3 => ReservationStatus::Expired,
            _ => ReservationStatus::Active,
        }
    }
}

impl From<ReservationStatus> for i16 {
    fn from(s: ReservationStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        };
        write!(f, "{}", label)
    }
}

/// A queued hold on an item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub patron_id: Uuid,
    pub reserved_date: DateTime<Utc>,
    pub expiry_date: DateTime<Utc>,
    pub pickup_date: Option<DateTime<Utc>>,
    pub status: ReservationStatus,
    /// Arrival rank among the item's active holds, lower is served first
    pub priority: i32,
    /// Loan created when the hold was fulfilled
    pub loan_id: Option<Uuid>,
}

impl Reservation {
    pub fn new(
        item_id: Uuid,
        patron_id: Uuid,
        now: DateTime<Utc>,
        hold_period_days: i64,
        priority: i32,
    ) -> AppResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            item_id,
            patron_id,
            reserved_date: now,
            expiry_date: super::days_after(now, hold_period_days)?,
            pickup_date: None,
            status: ReservationStatus::Active,
            priority,
            loan_id: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Strictly past expiry; a hold is still valid at its expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expiry_date
    }

    pub(crate) fn complete(&mut self, now: DateTime<Utc>, loan_id: Option<Uuid>) {
        self.status = ReservationStatus::Completed;
        self.pickup_date = Some(now);
        self.loan_id = loan_id;
    }

    pub(crate) fn cancel(&mut self) {
        self.status = ReservationStatus::Cancelled;
    }

    pub(crate) fn expire(&mut self) {
        self.status = ReservationStatus::Expired;
    }
}

/// Serving order: earliest reservation first, then lowest priority
pub fn queue_order(a: &Reservation, b: &Reservation) -> std::cmp::Ordering {
    a.reserved_date
        .cmp(&b.reserved_date)
        .then(a.priority.cmp(&b.priority))
        .then(a.id.cmp(&b.id))
}

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    pub expired: Vec<Reservation>,
    /// Items whose sweep failed and will be retried next run
    pub failed_items: Vec<Uuid>,
}
