//! Circulation services

pub mod clock;
pub mod email;
pub mod fines;
pub mod gate;
pub mod ledger;
pub mod locks;
pub mod notifications;
pub mod patrons;
pub mod registry;
pub mod reservations;
pub mod sweeper;

use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{CatalogItem, ItemStatus},
    repository::CirculationStore,
};

use self::{
    clock::Clock, fines::FinePolicy, locks::ItemLocks, notifications::NotificationDispatcher,
    patrons::PatronDirectory,
};

/// Collaborators and policy shared by every service
pub struct EngineContext {
    pub store: Arc<dyn CirculationStore>,
    pub patrons: Arc<dyn PatronDirectory>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
    pub locks: ItemLocks,
    pub policy: CirculationConfig,
}

impl EngineContext {
    pub fn fines(&self) -> FinePolicy {
        FinePolicy::from(&self.policy)
    }

    /// Item that can still take part in circulation. Retired items read as missing.
    pub(crate) async fn live_item(&self, item_id: Uuid) -> AppResult<CatalogItem> {
        let item = self.store.get_item(item_id).await?;
        if item.status == ItemStatus::Retired {
            return Err(AppError::NotFound(format!(
                "Catalog item with id {} is retired",
                item_id
            )));
        }
        Ok(item)
    }

    /// Re-run `op` while it loses optimistic-lock races, up to the configured attempts
    pub(crate) async fn retry_on_conflict<T, F, Fut>(&self, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let attempts = self.policy.max_commit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_concurrent_update() && attempt < attempts => {
                    tracing::debug!("Attempt {}/{} lost a race: {}", attempt, attempts, e);
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub registry: registry::CatalogRegistry,
    pub ledger: ledger::CirculationLedger,
    pub reservations: reservations::ReservationQueue,
    pub gate: gate::AvailabilityGate,
    context: Arc<EngineContext>,
}

impl Services {
    /// Wire the services around one store, directory, notifier and clock
    pub fn new(
        store: Arc<dyn CirculationStore>,
        patrons: Arc<dyn PatronDirectory>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        policy: CirculationConfig,
    ) -> Self {
        let context = Arc::new(EngineContext {
            store,
            patrons,
            notifier,
            clock,
            locks: ItemLocks::new(),
            policy,
        });

        Self {
            registry: registry::CatalogRegistry::new(context.clone()),
            ledger: ledger::CirculationLedger::new(context.clone()),
            reservations: reservations::ReservationQueue::new(context.clone()),
            gate: gate::AvailabilityGate::new(context.clone()),
            context,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }
}
