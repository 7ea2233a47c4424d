//! Circulation ledger: issue, extend and return loans

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{
        check_period, CatalogItem, CirculationRecord, CirculationStatus, CopyTransaction,
        ReturnCondition, ReturnReceipt,
    },
    repository::ChangeSet,
};

use super::{gate, registry, reservations, EngineContext};

#[derive(Clone)]
pub struct CirculationLedger {
    ctx: Arc<EngineContext>,
}

impl CirculationLedger {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Lend one copy of an item to a patron
    pub async fn issue(
        &self,
        item_id: Uuid,
        patron_id: Uuid,
        loan_period_days: i64,
    ) -> AppResult<CirculationRecord> {
        check_period("loan_period_days", loan_period_days)?;

        self.ctx
            .retry_on_conflict(move || self.try_issue(item_id, patron_id, loan_period_days))
            .await
    }

    /// Push the due date of an open loan forward
    pub async fn extend(
        &self,
        record_id: Uuid,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<CirculationRecord> {
        self.ctx
            .retry_on_conflict(move || self.try_extend(record_id, new_due_date))
            .await
    }

    /// Close a loan, computing its fine and passing the copy on to the queue
    pub async fn return_item(
        &self,
        record_id: Uuid,
        condition: ReturnCondition,
    ) -> AppResult<ReturnReceipt> {
        let receipt = self
            .ctx
            .retry_on_conflict(move || self.try_return(record_id, condition))
            .await?;

        if let Some(fulfillment) = &receipt.fulfillment {
            reservations::announce(&self.ctx, std::slice::from_ref(fulfillment));
        }
        Ok(receipt)
    }

    /// Mark the fine of a closed loan as paid
    pub async fn settle_fine(&self, record_id: Uuid) -> AppResult<CirculationRecord> {
        let (_guard, mut record) = self.locked_record(record_id).await?;

        if record.is_open() {
            return Err(AppError::InvalidTransition(format!(
                "Loan {} is still open",
                record_id
            )));
        }
        if record.fine_paid {
            return Err(AppError::InvalidTransition(format!(
                "Fine of loan {} is already settled",
                record_id
            )));
        }
        if record.fine_amount <= rust_decimal::Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "Loan {} carries no fine",
                record_id
            )));
        }

        record.fine_paid = true;
        let mut changes = ChangeSet::default();
        changes.update_record(&record);
        self.ctx.store.commit(changes).await?;

        tracing::info!(record_id = %record_id, "Fine of {} settled", record.fine_amount);
        Ok(record)
    }

    pub async fn get_record(&self, record_id: Uuid) -> AppResult<CirculationRecord> {
        self.ctx.store.get_record(record_id).await
    }

    /// Every loan of a patron, open and closed
    pub async fn patron_loans(&self, patron_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        self.ctx.store.records_by_patron(patron_id).await
    }

    pub async fn overdue_loans(&self) -> AppResult<Vec<CirculationRecord>> {
        self.ctx.store.overdue_records(self.ctx.clock.now()).await
    }

    /// Lock the record's item, then read the record again
    async fn locked_record(
        &self,
        record_id: Uuid,
    ) -> AppResult<(OwnedMutexGuard<()>, CirculationRecord)> {
        let item_id = self.ctx.store.get_record(record_id).await?.item_id;
        let guard = self.ctx.locks.acquire(item_id).await;
        let record = self.ctx.store.get_record(record_id).await?;
        Ok((guard, record))
    }

    /// Stage a new loan on `item`, completing the patron's own hold if any
    async fn plan_issue(
        &self,
        item: &mut CatalogItem,
        patron_id: Uuid,
        loan_period_days: i64,
        now: DateTime<Utc>,
        changes: &mut ChangeSet,
    ) -> AppResult<CirculationRecord> {
        registry::apply_transfer(item, CopyTransaction::Issue.transfer())?;
        let record = CirculationRecord::issue(item.id, patron_id, now, loan_period_days)?;
        changes.insert_record(&record);

        if let Some(mut hold) = self
            .ctx
            .store
            .active_reservation_for(item.id, patron_id)
            .await?
        {
            hold.complete(now, Some(record.id));
            changes.update_reservation(&hold);
        }

        Ok(record)
    }

    async fn try_issue(
        &self,
        item_id: Uuid,
        patron_id: Uuid,
        loan_period_days: i64,
    ) -> AppResult<CirculationRecord> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;

        gate::evaluate_issue(&self.ctx, &item, patron_id)
            .await?
            .into_result(item_id, patron_id)?;

        let now = self.ctx.clock.now();
        let mut changes = ChangeSet::default();
        let record = self
            .plan_issue(&mut item, patron_id, loan_period_days, now, &mut changes)
            .await?;
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(
            record_id = %record.id,
            item_id = %item_id,
            patron_id = %patron_id,
            "Issued loan due {}",
            record.due_date
        );
        Ok(record)
    }

    async fn try_extend(
        &self,
        record_id: Uuid,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<CirculationRecord> {
        let (_guard, mut record) = self.locked_record(record_id).await?;

        if !record.is_open() {
            return Err(AppError::InvalidTransition(format!(
                "Loan {} is {} and cannot be extended",
                record_id, record.status
            )));
        }
        if new_due_date <= record.due_date {
            return Err(AppError::Validation(format!(
                "New due date {} is not after the current due date {}",
                new_due_date, record.due_date
            )));
        }
        let max_extensions = i32::try_from(self.ctx.policy.max_extensions).unwrap_or(i32::MAX);
        if record.extension_count >= max_extensions {
            return Err(AppError::PolicyViolation(
                ErrorCode::ExtensionLimitReached,
                format!("Loan {} was already extended {} time(s)", record_id, record.extension_count),
            ));
        }
        if self.ctx.policy.block_extension_when_reserved
            && !self
                .ctx
                .store
                .active_reservations_by_item(record.item_id)
                .await?
                .is_empty()
        {
            return Err(AppError::Conflict(
                ErrorCode::HoldsPending,
                format!("Item {} has patrons waiting", record.item_id),
            ));
        }

        let now = self.ctx.clock.now();
        record.due_date = new_due_date;
        record.status = CirculationStatus::Extended;
        record.extended_date = Some(now);
        record.extension_count += 1;

        let mut item = self.ctx.store.get_item(record.item_id).await?;
        let mut changes = ChangeSet::default();
        changes.update_record(&record);
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(record_id = %record_id, "Loan extended to {}", new_due_date);
        Ok(record)
    }

    async fn try_return(
        &self,
        record_id: Uuid,
        condition: ReturnCondition,
    ) -> AppResult<ReturnReceipt> {
        let (_guard, mut record) = self.locked_record(record_id).await?;

        if !record.is_open() {
            return Err(AppError::InvalidTransition(format!(
                "Loan {} is already {}",
                record_id, record.status
            )));
        }

        let now = self.ctx.clock.now();
        record.status = condition.closing_status();
        record.return_date = Some(now);
        record.fine_amount = self.ctx.fines().fine_for(record.due_date, now);

        // Returns are accepted whatever the item status
        let mut item = self.ctx.store.get_item(record.item_id).await?;
        let mut changes = ChangeSet::default();
        registry::apply_transfer(&mut item, condition.copy_transaction().transfer())?;
        changes.update_record(&record);

        let fulfillment = if condition == ReturnCondition::Good && item.is_lendable() {
            reservations::plan_fulfillments(&self.ctx, &mut item, now, &mut changes, 1)
                .await?
                .pop()
        } else {
            None
        };

        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(
            record_id = %record_id,
            "Loan closed as {} with a fine of {}",
            record.status,
            record.fine_amount
        );
        Ok(ReturnReceipt {
            record,
            fulfillment,
        })
    }
}
