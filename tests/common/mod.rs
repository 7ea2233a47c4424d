//! Shared harness: the engine over an in-memory store with a manual clock

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use elidune_circulation::{
    config::CirculationConfig,
    error::AppResult,
    models::{CatalogItem, HoldReadyNotice},
    repository::{CirculationStore, MemoryStore},
    services::{
        clock::{Clock, ManualClock},
        notifications::NotificationDispatcher,
        patrons::MemoryPatronDirectory, Services,
    },
};

/// Notifier forwarding every notice to a channel
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<HoldReadyNotice>,
}

#[async_trait]
impl NotificationDispatcher for ChannelNotifier {
    async fn hold_ready(&self, notice: HoldReadyNotice) -> AppResult<()> {
        let _ = self.tx.send(notice);
        Ok(())
    }
}

pub struct Harness {
    pub services: Services,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub patrons: Arc<MemoryPatronDirectory>,
    notices: mpsc::UnboundedReceiver<HoldReadyNotice>,
}

/// Day 0 of every scenario
pub fn day_zero() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(CirculationConfig::default())
    }

    pub fn with_policy(policy: CirculationConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(day_zero()));
        let patrons = Arc::new(MemoryPatronDirectory::new(
            store.clone(),
            clock.clone(),
            policy.default_max_loans,
        ));
        let (tx, notices) = mpsc::unbounded_channel();

        let services = Services::new(
            store.clone(),
            patrons.clone(),
            Arc::new(ChannelNotifier { tx }),
            clock.clone(),
            policy,
        );

        Self {
            services,
            store,
            clock,
            patrons,
            notices,
        }
    }

    /// Move the clock to `days` after day 0
    pub fn set_day(&self, days: i64) {
        self.clock.set(day_zero() + Duration::days(days));
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Stored stock of an item, checked against the copy-count invariant
    pub async fn assert_balanced(&self, item_id: Uuid) -> CatalogItem {
        let item = self.store.get_item(item_id).await.unwrap();
        assert!(
            item.is_balanced(),
            "copy counts of item {} do not add up: {:?}",
            item_id,
            item
        );
        item
    }

    /// Next notice dispatched after a commit, if one arrives soon
    pub async fn next_notice(&mut self) -> Option<HoldReadyNotice> {
        tokio::time::timeout(std::time::Duration::from_secs(2), self.notices.recv())
            .await
            .ok()
            .flatten()
    }
}
