//! Reservation queue: holds, fulfillment and expiry

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        check_period, reservation::queue_order, CatalogItem, CirculationRecord, CopyTransaction,
        Fulfillment, HoldReadyNotice, Reservation, SweepReport,
    },
    repository::ChangeSet,
};

use super::{gate, notifications, registry, EngineContext};

/// Hand copies on `item` to waiting patrons, up to `limit` of them.
///
/// Stale holds met on the way are expired, patrons the gate refuses keep their
/// place. Staged writes land in `changes`; the caller stages the item and commits.
pub(crate) async fn plan_fulfillments(
    ctx: &EngineContext,
    item: &mut CatalogItem,
    now: DateTime<Utc>,
    changes: &mut ChangeSet,
    limit: usize,
) -> AppResult<Vec<Fulfillment>> {
    let mut queue = ctx.store.active_reservations_by_item(item.id).await?;
    queue.sort_by(queue_order);

    let mut fulfilled = Vec::new();
    for mut reservation in queue {
        if fulfilled.len() >= limit || item.available_copies <= 0 {
            break;
        }

        if reservation.is_expired_at(now) {
            reservation.expire();
            changes.update_reservation(&reservation);
            tracing::info!(reservation_id = %reservation.id, "Expired stale hold while serving the queue");
            continue;
        }

        if ctx
            .store
            .open_record_for(item.id, reservation.patron_id)
            .await?
            .is_some()
        {
            continue;
        }

        let decision = gate::evaluate_patron(ctx, reservation.patron_id).await?;
        if !decision.allowed {
            tracing::info!(
                reservation_id = %reservation.id,
                patron_id = %reservation.patron_id,
                "Skipping hold: {:?}",
                decision.reason
            );
            continue;
        }

        registry::apply_transfer(item, CopyTransaction::Issue.transfer())?;
        let loan = CirculationRecord::issue(
            item.id,
            reservation.patron_id,
            now,
            ctx.policy.loan_period_days,
        )?;
        reservation.complete(now, Some(loan.id));
        changes.insert_record(&loan);
        changes.update_reservation(&reservation);

        tracing::info!(
            reservation_id = %reservation.id,
            loan_id = %loan.id,
            "Hold fulfilled"
        );
        fulfilled.push(Fulfillment { reservation, loan });
    }

    Ok(fulfilled)
}

/// Notify patrons whose holds were just committed as loans
pub(crate) fn announce(ctx: &EngineContext, fulfilled: &[Fulfillment]) {
    for fulfillment in fulfilled {
        notifications::dispatch(&ctx.notifier, HoldReadyNotice::from(fulfillment));
    }
}

#[derive(Clone)]
pub struct ReservationQueue {
    ctx: Arc<EngineContext>,
}

impl ReservationQueue {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Place a hold on an item with no copy on the shelf
    pub async fn reserve(
        &self,
        item_id: Uuid,
        patron_id: Uuid,
        hold_period_days: i64,
    ) -> AppResult<Reservation> {
        check_period("hold_period_days", hold_period_days)?;

        self.ctx
            .retry_on_conflict(move || self.try_reserve(item_id, patron_id, hold_period_days))
            .await
    }

    pub async fn cancel(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        self.ctx
            .retry_on_conflict(move || self.try_cancel(reservation_id))
            .await
    }

    /// Serve the head of the queue with an available copy, if anyone qualifies
    pub async fn fulfill_next(&self, item_id: Uuid) -> AppResult<Option<Fulfillment>> {
        let fulfillment = self
            .ctx
            .retry_on_conflict(move || self.try_fulfill_next(item_id))
            .await?;

        if let Some(fulfillment) = &fulfillment {
            announce(&self.ctx, std::slice::from_ref(fulfillment));
        }
        Ok(fulfillment)
    }

    /// Expire every ACTIVE hold past its expiry date, item by item
    pub async fn sweep_expired(&self) -> AppResult<SweepReport> {
        let now = self.ctx.clock.now();
        let candidates = self.ctx.store.expired_reservations(now).await?;

        let mut item_ids: Vec<Uuid> = Vec::new();
        for reservation in &candidates {
            if !item_ids.contains(&reservation.item_id) {
                item_ids.push(reservation.item_id);
            }
        }

        let mut report = SweepReport::default();
        for item_id in item_ids {
            match self
                .ctx
                .retry_on_conflict(move || self.try_sweep_item(item_id, now))
                .await
            {
                Ok(mut expired) => report.expired.append(&mut expired),
                Err(e) => {
                    tracing::warn!(item_id = %item_id, "Hold sweep failed: {}", e);
                    report.failed_items.push(item_id);
                }
            }
        }

        if !report.expired.is_empty() || !report.failed_items.is_empty() {
            tracing::info!(
                "Hold sweep expired {} reservation(s), {} item(s) failed",
                report.expired.len(),
                report.failed_items.len()
            );
        }
        Ok(report)
    }

    /// ACTIVE holds of an item in serving order
    pub async fn queue_for_item(&self, item_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.ctx.store.get_item(item_id).await?;
        let mut queue = self.ctx.store.active_reservations_by_item(item_id).await?;
        queue.sort_by(queue_order);
        Ok(queue)
    }

    pub async fn patron_reservations(&self, patron_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.ctx.store.reservations_by_patron(patron_id).await
    }

    pub async fn get_reservation(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        self.ctx.store.get_reservation(reservation_id).await
    }

    /// Drop lock entries nobody holds
    pub fn prune_locks(&self) {
        self.ctx.locks.prune();
    }

    async fn try_reserve(
        &self,
        item_id: Uuid,
        patron_id: Uuid,
        hold_period_days: i64,
    ) -> AppResult<Reservation> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;

        gate::evaluate_reserve(&self.ctx, &item, patron_id)
            .await?
            .into_result(item_id, patron_id)?;

        let priority = self
            .ctx
            .store
            .active_reservations_by_item(item_id)
            .await?
            .iter()
            .map(|r| r.priority)
            .max()
            .unwrap_or(0)
            + 1;

        let now = self.ctx.clock.now();
        let reservation = Reservation::new(item_id, patron_id, now, hold_period_days, priority)?;
        let mut changes = ChangeSet::default();
        changes.insert_reservation(&reservation);
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(
            reservation_id = %reservation.id,
            item_id = %item_id,
            patron_id = %patron_id,
            "Reservation placed at priority {}",
            priority
        );
        Ok(reservation)
    }

    async fn try_cancel(&self, reservation_id: Uuid) -> AppResult<Reservation> {
        let item_id = self.ctx.store.get_reservation(reservation_id).await?.item_id;
        let _guard = self.ctx.locks.acquire(item_id).await;

        let mut reservation = self.ctx.store.get_reservation(reservation_id).await?;
        if !reservation.is_active() {
            return Err(AppError::InvalidTransition(format!(
                "Reservation {} is {} and cannot be cancelled",
                reservation_id, reservation.status
            )));
        }

        let now = self.ctx.clock.now();
        let mut item = self.ctx.store.get_item(item_id).await?;
        let mut changes = ChangeSet::default();
        reservation.cancel();
        changes.update_reservation(&reservation);
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        tracing::info!(reservation_id = %reservation_id, "Reservation cancelled");
        Ok(reservation)
    }

    async fn try_fulfill_next(&self, item_id: Uuid) -> AppResult<Option<Fulfillment>> {
        let _guard = self.ctx.locks.acquire(item_id).await;
        let mut item = self.ctx.live_item(item_id).await?;
        if !item.is_lendable() || item.available_copies <= 0 {
            return Ok(None);
        }

        let now = self.ctx.clock.now();
        let mut changes = ChangeSet::default();
        let fulfillment = plan_fulfillments(&self.ctx, &mut item, now, &mut changes, 1)
            .await?
            .pop();

        if !changes.is_empty() {
            changes.update_item(&mut item, now);
            self.ctx.store.commit(changes).await?;
        }
        Ok(fulfillment)
    }

    async fn try_sweep_item(&self, item_id: Uuid, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let _guard = self.ctx.locks.acquire(item_id).await;

        // Re-read under the lock: the hold may have been served or cancelled meanwhile
        let mut expired: Vec<Reservation> = self
            .ctx
            .store
            .active_reservations_by_item(item_id)
            .await?
            .into_iter()
            .filter(|r| r.is_expired_at(now))
            .collect();
        if expired.is_empty() {
            return Ok(expired);
        }

        let mut item = self.ctx.store.get_item(item_id).await?;
        let mut changes = ChangeSet::default();
        for reservation in &mut expired {
            reservation.expire();
            changes.update_reservation(reservation);
        }
        changes.update_item(&mut item, now);
        self.ctx.store.commit(changes).await?;

        Ok(expired)
    }
}
