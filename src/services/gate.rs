//! Availability gate: decides whether an issue or a reservation may proceed.
//!
//! Mutating paths call the `evaluate_*` functions under the item lock with the
//! item they are about to change. `AvailabilityGate` exposes the same checks
//! read-only for display, against whatever snapshot the store returns.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::CatalogItem,
};

use super::EngineContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateReason {
    Ok,
    NoCopiesAvailable,
    ItemInactive,
    DuplicateLoan,
    DuplicateReservation,
    LoanLimitExceeded,
    HasOverdueLoan,
    /// Reservation refused because a copy can be borrowed right away
    CopiesAvailable,
}

impl GateReason {
    pub fn error_code(self) -> ErrorCode {
        match self {
            GateReason::Ok => ErrorCode::Success,
            GateReason::NoCopiesAvailable => ErrorCode::NoCopiesAvailable,
            GateReason::ItemInactive => ErrorCode::ItemInactive,
            GateReason::DuplicateLoan => ErrorCode::DuplicateLoan,
            GateReason::DuplicateReservation => ErrorCode::DuplicateReservation,
            GateReason::LoanLimitExceeded => ErrorCode::LoanLimitExceeded,
            GateReason::HasOverdueLoan => ErrorCode::HasOverdueLoan,
            GateReason::CopiesAvailable => ErrorCode::CopiesAvailable,
        }
    }

    /// Patron-side refusals, as opposed to item-side conflicts
    pub fn is_policy(self) -> bool {
        matches!(self, GateReason::LoanLimitExceeded | GateReason::HasOverdueLoan)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: GateReason,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: GateReason::Ok,
        }
    }

    pub fn deny(reason: GateReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    /// Turn a refusal into the matching typed error
    pub fn into_result(self, item_id: Uuid, patron_id: Uuid) -> AppResult<()> {
        if self.allowed {
            return Ok(());
        }
        let code = self.reason.error_code();
        let message = match self.reason {
            GateReason::NoCopiesAvailable => format!("No copies of item {} are available", item_id),
            GateReason::ItemInactive => format!("Item {} is not lendable", item_id),
            GateReason::DuplicateLoan => {
                format!("Patron {} already has item {} on loan", patron_id, item_id)
            }
            GateReason::DuplicateReservation => {
                format!("Patron {} already holds a reservation on item {}", patron_id, item_id)
            }
            GateReason::LoanLimitExceeded => format!("Patron {} reached the loan limit", patron_id),
            GateReason::HasOverdueLoan => format!("Patron {} has an overdue loan", patron_id),
            GateReason::CopiesAvailable => {
                format!("Item {} has copies on the shelf, borrow it instead", item_id)
            }
            GateReason::Ok => String::new(),
        };

        if self.reason.is_policy() {
            Err(AppError::PolicyViolation(code, message))
        } else {
            Err(AppError::Conflict(code, message))
        }
    }
}

/// Patron eligibility part of the gate
pub(crate) async fn evaluate_patron(ctx: &EngineContext, patron_id: Uuid) -> AppResult<GateDecision> {
    let eligibility = ctx.patrons.get_eligibility(patron_id).await?;
    if ctx.policy.block_on_overdue && eligibility.has_overdue_loan {
        return Ok(GateDecision::deny(GateReason::HasOverdueLoan));
    }
    if eligibility.at_loan_limit() {
        return Ok(GateDecision::deny(GateReason::LoanLimitExceeded));
    }
    Ok(GateDecision::allow())
}

pub(crate) async fn evaluate_issue(
    ctx: &EngineContext,
    item: &CatalogItem,
    patron_id: Uuid,
) -> AppResult<GateDecision> {
    if !item.is_lendable() {
        return Ok(GateDecision::deny(GateReason::ItemInactive));
    }
    if ctx.store.open_record_for(item.id, patron_id).await?.is_some() {
        return Ok(GateDecision::deny(GateReason::DuplicateLoan));
    }
    if item.available_copies <= 0 {
        return Ok(GateDecision::deny(GateReason::NoCopiesAvailable));
    }
    evaluate_patron(ctx, patron_id).await
}

pub(crate) async fn evaluate_reserve(
    ctx: &EngineContext,
    item: &CatalogItem,
    patron_id: Uuid,
) -> AppResult<GateDecision> {
    if !item.is_lendable() {
        return Ok(GateDecision::deny(GateReason::ItemInactive));
    }
    if ctx.store.open_record_for(item.id, patron_id).await?.is_some() {
        return Ok(GateDecision::deny(GateReason::DuplicateLoan));
    }
    if ctx.store.active_reservation_for(item.id, patron_id).await?.is_some() {
        return Ok(GateDecision::deny(GateReason::DuplicateReservation));
    }
    if ctx.policy.reserve_requires_unavailable && item.available_copies > 0 {
        return Ok(GateDecision::deny(GateReason::CopiesAvailable));
    }
    evaluate_patron(ctx, patron_id).await
}

/// Read-only access to the gate
#[derive(Clone)]
pub struct AvailabilityGate {
    ctx: Arc<EngineContext>,
}

impl AvailabilityGate {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Could `patron_id` borrow `item_id` now?
    pub async fn check_issue(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<GateDecision> {
        let item = self.ctx.live_item(item_id).await?;
        evaluate_issue(&self.ctx, &item, patron_id).await
    }

    /// Could `patron_id` reserve `item_id` now?
    pub async fn check_reserve(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<GateDecision> {
        let item = self.ctx.live_item(item_id).await?;
        evaluate_reserve(&self.ctx, &item, patron_id).await
    }
}
