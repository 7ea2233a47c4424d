//! Catalog item registry: owns the copy counters of every item.
//!
//! Every quantity change goes through [`apply_transfer`], which moves exactly
//! one copy between two buckets and re-checks the balance afterwards.

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{CatalogItem, CopyBucket, CopyTransaction, CopyTransfer, Fulfillment, ItemStatus},
    repository::ChangeSet,
};

use super::{reservations, EngineContext};

/// Fail loudly when the copy counters no longer add up
pub(crate) fn verify_invariant(item: &CatalogItem) -> AppResult<()> {
    if item.is_balanced() {
        return Ok(());
    }
    tracing::error!(
        item_id = %item.id,
        total = item.total_copies,
        available = item.available_copies,
        borrowed = item.borrowed_copies,
        reserved = item.reserved_copies,
        lost = item.lost_copies,
        damaged = item.damaged_copies,
        "Copy counters out of balance"
    );
    Err(AppError::InvariantViolation(format!(
        "Copy counters of item {} sum to {} for a total of {}",
        item.id,
        item.bucket_sum(),
        item.total_copies
    )))
}

/// Move one copy between two buckets of an in-memory item
pub(crate) fn apply_transfer(item: &mut CatalogItem, transfer: CopyTransfer) -> AppResult<()> {
    verify_invariant(item)?;
    if item.count(transfer.from) <= 0 {
        return Err(AppError::Conflict(
            ErrorCode::EmptyBucket,
            format!("Item {} has no {} copy to move", item.id, transfer.from),
        ));
    }
    for (bucket, delta) in transfer.deltas() {
        *item.count_mut(bucket) += delta;
    }
    verify_invariant(item)
}

#[derive(Clone)]
pub struct CatalogRegistry {
    ctx: Arc<EngineContext>,
}

impl CatalogRegistry {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Register a new ACTIVE item with every copy available
    pub async fn register_item(&self, total_copies: i32) -> AppResult<CatalogItem> {
        if total_copies < 1 {
            return Err(AppError::Validation(
                "total_copies must be at least 1".to_string(),
            ));
        }

        let item = CatalogItem::new(total_copies, self.ctx.clock.now());
        let mut changes = ChangeSet::default();
        changes.insert_item(&item);
        self.ctx.store.commit(changes).await?;

        tracing::info!(item_id = %item.id, "Registered item with {} copies", total_copies);
        Ok(item)
    }

    /// Snapshot of an item, retired ones included
    pub async fn get_item(&self, item_id: Uuid) -> AppResult<CatalogItem> {
        self.ctx.store.get_item(item_id).await
    }

    pub async fn list_items(&self) -> AppResult<Vec<CatalogItem>> {
        self.ctx.store.list_items().await
    }

    /// Move one copy from `from` to `to`
    pub async fn transfer_copy(
        &self,
        item_id: Uuid,
        from: CopyBucket,
        to: CopyBucket,
    ) -> AppResult<CatalogItem> {
        if from == to {
            return Err(AppError::Validation(format!(
                "Cannot transfer a copy from {} to itself",
                from
            )));
        }

        let transfer = CopyTransfer::new(from, to);
        let (item, fulfilled) = self
            .ctx
            .retry_on_conflict(move || self.try_transfer(item_id, transfer))
            .await?;

        reservations::announce(&self.ctx, &fulfilled);
        Ok(item)
    }

    /// Apply a staff stock movement from the transaction table
    pub async fn apply_transaction(
        &self,
        item_id: Uuid,
        kind: CopyTransaction,
    ) -> AppResult<CatalogItem> {
        if kind.is_loan_driven() {
            return Err(AppError::Validation(format!(
                "{:?} is recorded through the loan ledger",
                kind
            )));
        }
        let transfer = kind.transfer();
        self.transfer_copy(item_id, transfer.from, transfer.to).await
    }

    /// Take an item out of circulation for good
    pub async fn retire_item(&self, item_id: Uuid) -> AppResult<CatalogItem> {
        self.ctx
            .retry_on_conflict(move || self.try_retire(item_id))
            .await
    }

    /// Switch between ACTIVE, INACTIVE and MAINTENANCE
    pub async fn set_status(&self, item_id: Uuid, status: ItemStatus) -> AppResult<CatalogItem> {
        if status == ItemStatus::Retired {
            return Err(AppError::Validation(
                "Items are retired through the retire operation".to_string(),
            ));
        }

        let (item, fulfilled) = self
            .ctx
            .retry_on_conflict(move || self.try_set_status(item_id, status))
            .await?;

        reservations::announce(&self.ctx, &fulfilled);
        Ok(item)
    }

    async fn try_transfer(
        &self,
        item_id: Uuid,
        transfer: CopyTransfer,
    ) -> AppResult<(CatalogItem, Vec<Fulfillment>)> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;
        let now = self.ctx.clock.now();
        let mut changes = ChangeSet::default();

        apply_transfer(&mut item, transfer)?;

        let fulfilled = if transfer.to == CopyBucket::Available && item.is_lendable() {
            reservations::plan_fulfillments(&self.ctx, &mut item, now, &mut changes, 1).await?
        } else {
            Vec::new()
        };

        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::debug!(item_id = %item_id, "Moved one copy {} -> {}", transfer.from, transfer.to);
        Ok((item, fulfilled))
    }

    async fn try_retire(&self, item_id: Uuid) -> AppResult<CatalogItem> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;

        let open_loans = self.ctx.store.open_records_by_item(item_id).await?;
        let holds = self.ctx.store.active_reservations_by_item(item_id).await?;
        if !open_loans.is_empty() || !holds.is_empty() {
            return Err(AppError::Conflict(
                ErrorCode::OutstandingCirculation,
                format!(
                    "Item {} has {} open loan(s) and {} active reservation(s)",
                    item_id,
                    open_loans.len(),
                    holds.len()
                ),
            ));
        }

        let now = self.ctx.clock.now();
        let mut changes = ChangeSet::default();
        item.status = ItemStatus::Retired;
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(item_id = %item_id, "Retired item");
        Ok(item)
    }

    async fn try_set_status(
        &self,
        item_id: Uuid,
        status: ItemStatus,
    ) -> AppResult<(CatalogItem, Vec<Fulfillment>)> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;
        if item.status == status {
            return Ok((item, Vec::new()));
        }

        let now = self.ctx.clock.now();
        let mut changes = ChangeSet::default();
        item.status = status;

        // Copies already on the shelf go to waiting patrons
        let fulfilled = if item.is_lendable() && item.available_copies > 0 {
            let limit = usize::try_from(item.available_copies).unwrap_or_default();
            reservations::plan_fulfillments(&self.ctx, &mut item, now, &mut changes, limit).await?
        } else {
            Vec::new()
        };

        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(item_id = %item_id, "Item status set to {:?}", status);
        Ok((item, fulfilled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing;

    #[test]
    fn test_apply_transfer_moves_one_copy() {
        let mut item = CatalogItem::new(2, chrono::Utc::now());
        apply_transfer(&mut item, CopyTransaction::ShelfDamage.transfer()).unwrap();
        assert_eq!(item.available_copies, 1);
        assert_eq!(item.damaged_copies, 1);
        assert!(item.is_balanced());
    }

    #[test]
    fn test_apply_transfer_empty_bucket() {
        let mut item = CatalogItem::new(1, chrono::Utc::now());
        let err = apply_transfer(&mut item, CopyTransaction::Recover.transfer()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(ErrorCode::EmptyBucket, _)));
        assert_eq!(item.available_copies, 1);
        assert_eq!(item.lost_copies, 0);
    }

    #[tokio::test]
    async fn test_register_rejects_zero_copies() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let err = registry.register_item(0).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_transfer_bumps_version() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let item = registry.register_item(3).await.unwrap();

        let moved = registry
            .transfer_copy(item.id, CopyBucket::Available, CopyBucket::Reserved)
            .await
            .unwrap();
        assert_eq!(moved.available_copies, 2);
        assert_eq!(moved.reserved_copies, 1);
        assert_eq!(moved.version, item.version + 1);

        let stored = registry.get_item(item.id).await.unwrap();
        assert_eq!(stored, moved);
    }

    #[tokio::test]
    async fn test_transfer_to_same_bucket_is_invalid() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let item = registry.register_item(1).await.unwrap();

        let err = registry
            .transfer_copy(item.id, CopyBucket::Lost, CopyBucket::Lost)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_loan_driven_transactions_rejected() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let item = registry.register_item(1).await.unwrap();

        for kind in CopyTransaction::ALL.into_iter().filter(|k| k.is_loan_driven()) {
            let err = registry.apply_transaction(item.id, kind).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?}", kind);
        }

        let item = registry
            .apply_transaction(item.id, CopyTransaction::ShelfLoss)
            .await
            .unwrap();
        assert_eq!(item.lost_copies, 1);
        let item = registry
            .apply_transaction(item.id, CopyTransaction::Recover)
            .await
            .unwrap();
        assert_eq!(item.available_copies, 1);
    }

    #[tokio::test]
    async fn test_corrupted_item_is_never_clamped() {
        let (ctx, store, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let mut item = registry.register_item(2).await.unwrap();
        item.available_copies = 5;
        store.force_item(item.clone()).unwrap();

        let err = registry
            .transfer_copy(item.id, CopyBucket::Available, CopyBucket::Damaged)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(registry.get_item(item.id).await.unwrap().available_copies, 5);
    }

    #[tokio::test]
    async fn test_retired_item_reads_as_missing() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let item = registry.register_item(1).await.unwrap();

        let retired = registry.retire_item(item.id).await.unwrap();
        assert_eq!(retired.status, ItemStatus::Retired);

        let err = registry
            .transfer_copy(item.id, CopyBucket::Available, CopyBucket::Lost)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = registry.set_status(item.id, ItemStatus::Active).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_set_status_cannot_retire() {
        let (ctx, _, _) = testing::context();
        let registry = CatalogRegistry::new(ctx);
        let item = registry.register_item(1).await.unwrap();

        let err = registry.set_status(item.id, ItemStatus::Retired).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let item = registry.set_status(item.id, ItemStatus::Maintenance).await.unwrap();
        assert!(!item.is_lendable());
    }
}
