//! Circulation record (one loan of one copy) and related types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppResult;

use super::catalog_item::CopyTransaction;
use super::reservation::Reservation;

/// Loan status. ISSUED and EXTENDED are open, the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum CirculationStatus {
    Issued = 0,
    Extended = 1,
    Returned = 2,
    Lost = 3,
    Damaged = 4,
}

impl CirculationStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, CirculationStatus::Issued | CirculationStatus::Extended)
    }

    /// Codes of the open statuses, for SQL filters
    pub const OPEN_CODES: [i16; 2] = [
        CirculationStatus::Issued as i16,
        CirculationStatus::Extended as i16,
    ];
}

impl From<i16> for CirculationStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => CirculationStatus::Extended,
            2 => CirculationStatus::Returned,
            3 => CirculationStatus::Lost,
            4 => CirculationStatus::Damaged,
            _ => CirculationStatus::Issued,
        }
    }
}

impl From<CirculationStatus> for i16 {
    fn from(s: CirculationStatus) -> Self {
        s as i16
    }
}

impl std::fmt::Display for CirculationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CirculationStatus::Issued => "ISSUED",
            CirculationStatus::Extended => "EXTENDED",
            CirculationStatus::Returned => "RETURNED",
            CirculationStatus::Lost => "LOST",
            CirculationStatus::Damaged => "DAMAGED",
        };
        write!(f, "{}", label)
    }
}

/// Condition reported when a loan is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCondition {
    #[default]
    Good,
    Lost,
    Damaged,
}

impl ReturnCondition {
    pub fn closing_status(&self) -> CirculationStatus {
        match self {
            ReturnCondition::Good => CirculationStatus::Returned,
            ReturnCondition::Lost => CirculationStatus::Lost,
            ReturnCondition::Damaged => CirculationStatus::Damaged,
        }
    }

    pub fn copy_transaction(&self) -> CopyTransaction {
        match self {
            ReturnCondition::Good => CopyTransaction::Return,
            ReturnCondition::Lost => CopyTransaction::ReportLost,
            ReturnCondition::Damaged => CopyTransaction::ReportDamaged,
        }
    }
}

/// One loan of one copy to one patron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CirculationRecord {
    pub id: Uuid,
    pub item_id: Uuid,
    pub patron_id: Uuid,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub extended_date: Option<DateTime<Utc>>,
    pub extension_count: i32,
    pub return_date: Option<DateTime<Utc>>,
    pub status: CirculationStatus,
    pub fine_amount: Decimal,
    pub fine_paid: bool,
}

impl CirculationRecord {
    /// Freshly issued loan due `loan_period_days` after `now`
    pub fn issue(
        item_id: Uuid,
        patron_id: Uuid,
        now: DateTime<Utc>,
        loan_period_days: i64,
    ) -> AppResult<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            item_id,
            patron_id,
            issue_date: now,
            due_date: super::days_after(now, loan_period_days)?,
            extended_date: None,
            extension_count: 0,
            return_date: None,
            status: CirculationStatus::Issued,
            fine_amount: Decimal::ZERO,
            fine_paid: false,
        })
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date < now
    }

    /// Amount still owed on a closed loan
    pub fn outstanding_fine(&self) -> Decimal {
        if self.fine_paid {
            Decimal::ZERO
        } else {
            self.fine_amount
        }
    }
}

/// Result of closing a loan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnReceipt {
    pub record: CirculationRecord,
    /// Hold converted into a loan with the returned copy, if any
    pub fulfillment: Option<Fulfillment>,
}

/// A reservation converted into a loan
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Fulfillment {
    pub reservation: Reservation,
    pub loan: CirculationRecord,
}
