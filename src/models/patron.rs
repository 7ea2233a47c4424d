//! Patron-facing types. Patrons are owned by an external directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::circulation::Fulfillment;

/// Lending eligibility as reported by the patron directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatronEligibility {
    pub active_loan_count: u32,
    pub has_overdue_loan: bool,
    pub max_concurrent_loans: u32,
}

impl PatronEligibility {
    pub fn at_loan_limit(&self) -> bool {
        self.active_loan_count >= self.max_concurrent_loans
    }
}

/// Message sent to a patron whose hold turned into a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldReadyNotice {
    pub reservation_id: Uuid,
    pub item_id: Uuid,
    pub patron_id: Uuid,
    pub loan_id: Uuid,
    pub due_date: DateTime<Utc>,
}

impl From<&Fulfillment> for HoldReadyNotice {
    fn from(f: &Fulfillment) -> Self {
        Self {
            reservation_id: f.reservation.id,
            item_id: f.reservation.item_id,
            patron_id: f.reservation.patron_id,
            loan_id: f.loan.id,
            due_date: f.loan.due_date,
        }
    }
}
