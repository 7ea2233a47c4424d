//! Repository layer: the store contract used by the engine and its backends.
//!
//! Reads go straight to the backend. Writes are collected in a [`ChangeSet`]
//! and applied by [`CirculationStore::commit`] as a single transaction, so an
//! operation either lands completely or not at all.

pub mod items;
pub mod loans;
pub mod memory;
pub mod patrons;
pub mod reservations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{CatalogItem, CirculationRecord, Reservation},
};

pub use memory::MemoryStore;

/// Write of a catalog item inside a change set
#[derive(Debug, Clone)]
pub enum ItemWrite {
    Insert(CatalogItem),
    /// Stored row must still carry `expected_version`
    Update { item: CatalogItem, expected_version: i64 },
}

/// Insert or update of a row keyed by id
#[derive(Debug, Clone)]
pub enum RowWrite<T> {
    Insert(T),
    Update(T),
}

/// All writes of one engine operation
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub item: Option<ItemWrite>,
    pub records: Vec<RowWrite<CirculationRecord>>,
    pub reservations: Vec<RowWrite<Reservation>>,
}

impl ChangeSet {
    pub fn insert_item(&mut self, item: &CatalogItem) {
        self.item = Some(ItemWrite::Insert(item.clone()));
    }

    /// Stage the item and bump its version. Call once, after all mutations.
    pub fn update_item(&mut self, item: &mut CatalogItem, now: DateTime<Utc>) {
        let expected_version = item.version;
        item.version += 1;
        item.updated_at = now;
        self.item = Some(ItemWrite::Update {
            item: item.clone(),
            expected_version,
        });
    }

    pub fn insert_record(&mut self, record: &CirculationRecord) {
        self.records.push(RowWrite::Insert(record.clone()));
    }

    pub fn update_record(&mut self, record: &CirculationRecord) {
        self.records.push(RowWrite::Update(record.clone()));
    }

    pub fn insert_reservation(&mut self, reservation: &Reservation) {
        self.reservations.push(RowWrite::Insert(reservation.clone()));
    }

    pub fn update_reservation(&mut self, reservation: &Reservation) {
        self.reservations.push(RowWrite::Update(reservation.clone()));
    }

    pub fn is_empty(&self) -> bool {
        self.item.is_none() && self.records.is_empty() && self.reservations.is_empty()
    }
}

/// Conflict returned when a versioned item write loses a race
pub(crate) fn stale_item(id: Uuid) -> AppError {
    AppError::Conflict(
        ErrorCode::ConcurrentUpdate,
        format!("Catalog item {} was modified concurrently", id),
    )
}

/// Persistence contract of the circulation engine
#[async_trait]
pub trait CirculationStore: Send + Sync {
    /// Cheap round trip proving the store answers
    async fn ping(&self) -> AppResult<()>;

    /// Item by id, including retired ones
    async fn get_item(&self, id: Uuid) -> AppResult<CatalogItem>;

    async fn list_items(&self) -> AppResult<Vec<CatalogItem>>;

    async fn get_record(&self, id: Uuid) -> AppResult<CirculationRecord>;

    async fn get_reservation(&self, id: Uuid) -> AppResult<Reservation>;

    /// Open (ISSUED/EXTENDED) loan for the pair, if any
    async fn open_record_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<CirculationRecord>>;

    /// ACTIVE reservation for the pair, if any
    async fn active_reservation_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<Reservation>>;

    /// ACTIVE reservations of an item in serving order
    async fn active_reservations_by_item(&self, item_id: Uuid) -> AppResult<Vec<Reservation>>;

    /// ACTIVE reservations with `expiry_date < now`
    async fn expired_reservations(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>>;

    async fn open_records_by_item(&self, item_id: Uuid) -> AppResult<Vec<CirculationRecord>>;

    async fn records_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<CirculationRecord>>;

    async fn reservations_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<Reservation>>;

    /// Open loans with `due_date < now`
    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<CirculationRecord>>;

    /// Apply every write of the change set atomically
    async fn commit(&self, changes: ChangeSet) -> AppResult<()>;
}

/// PostgreSQL-backed store holding the connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub items: items::ItemsRepository,
    pub loans: loans::LoansRepository,
    pub reservations: reservations::ReservationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            items: items::ItemsRepository::new(pool.clone()),
            loans: loans::LoansRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl CirculationStore for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> AppResult<CatalogItem> {
        self.items.get_by_id(id).await
    }

    async fn list_items(&self) -> AppResult<Vec<CatalogItem>> {
        self.items.list().await
    }

    async fn get_record(&self, id: Uuid) -> AppResult<CirculationRecord> {
        self.loans.get_by_id(id).await
    }

    async fn get_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        self.reservations.get_by_id(id).await
    }

    async fn open_record_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<CirculationRecord>> {
        self.loans.open_for(item_id, patron_id).await
    }

    async fn active_reservation_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<Reservation>> {
        self.reservations.active_for(item_id, patron_id).await
    }

    async fn active_reservations_by_item(&self, item_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.reservations.active_by_item(item_id).await
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        self.reservations.expired(now).await
    }

    async fn open_records_by_item(&self, item_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        self.loans.open_by_item(item_id).await
    }

    async fn records_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        self.loans.by_patron(patron_id).await
    }

    async fn reservations_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<Reservation>> {
        self.reservations.by_patron(patron_id).await
    }

    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<CirculationRecord>> {
        self.loans.overdue(now).await
    }

    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on an early return rolls it back
        let mut tx = self.pool.begin().await?;

        match &changes.item {
            Some(ItemWrite::Insert(item)) => items::ItemsRepository::insert(&mut tx, item).await?,
            Some(ItemWrite::Update { item, expected_version }) => {
                items::ItemsRepository::update_versioned(&mut tx, item, *expected_version).await?
            }
            None => {}
        }

        for write in &changes.records {
            match write {
                RowWrite::Insert(record) => loans::LoansRepository::insert(&mut tx, record).await?,
                RowWrite::Update(record) => loans::LoansRepository::update(&mut tx, record).await?,
            }
        }

        for write in &changes.reservations {
            match write {
                RowWrite::Insert(reservation) => {
                    reservations::ReservationsRepository::insert(&mut tx, reservation).await?
                }
                RowWrite::Update(reservation) => {
                    reservations::ReservationsRepository::update(&mut tx, reservation).await?
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
