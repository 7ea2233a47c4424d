//! In-process store used for embedding and tests.
//!
//! A single `RwLock` guards all three tables; `commit` validates every write
//! before applying any of them, which gives the same all-or-nothing behavior as
//! the database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{reservation::queue_order, CatalogItem, CirculationRecord, Reservation},
};

use super::{stale_item, ChangeSet, CirculationStore, ItemWrite, RowWrite};

#[derive(Debug, Default)]
struct Tables {
    items: HashMap<Uuid, CatalogItem>,
    records: HashMap<Uuid, CirculationRecord>,
    reservations: HashMap<Uuid, Reservation>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("Memory store lock poisoned".to_string()))
    }

    /// Every record ever written, for test assertions
    pub fn all_records(&self) -> AppResult<Vec<CirculationRecord>> {
        let mut records: Vec<_> = self.read()?.records.values().cloned().collect();
        records.sort_by_key(|r| (r.issue_date, r.id));
        Ok(records)
    }

    /// Overwrite an item without any checks. Only meant for fault-injection tests.
    #[doc(hidden)]
    pub fn force_item(&self, item: CatalogItem) -> AppResult<()> {
        self.write()?.items.insert(item.id, item);
        Ok(())
    }
}

fn check(tables: &Tables, changes: &ChangeSet) -> AppResult<()> {
    match &changes.item {
        Some(ItemWrite::Insert(item)) if tables.items.contains_key(&item.id) => {
            return Err(AppError::Conflict(
                ErrorCode::Failure,
                format!("Catalog item {} already exists", item.id),
            ));
        }
        Some(ItemWrite::Update { item, expected_version }) => match tables.items.get(&item.id) {
            None => {
                return Err(AppError::NotFound(format!(
                    "Catalog item with id {} not found",
                    item.id
                )))
            }
            Some(stored) if stored.version != *expected_version => return Err(stale_item(item.id)),
            Some(_) => {}
        },
        _ => {}
    }

    for write in &changes.records {
        match write {
            RowWrite::Insert(record) => {
                let duplicate = tables.records.values().any(|r| {
                    r.is_open() && r.item_id == record.item_id && r.patron_id == record.patron_id
                });
                if duplicate && record.is_open() {
                    return Err(AppError::Conflict(
                        ErrorCode::DuplicateLoan,
                        format!(
                            "Patron {} already has an open loan on item {}",
                            record.patron_id, record.item_id
                        ),
                    ));
                }
            }
            RowWrite::Update(record) if !tables.records.contains_key(&record.id) => {
                return Err(AppError::NotFound(format!("Loan with id {} not found", record.id)));
            }
            RowWrite::Update(_) => {}
        }
    }

    for write in &changes.reservations {
        if let RowWrite::Update(reservation) = write {
            if !tables.reservations.contains_key(&reservation.id) {
                return Err(AppError::NotFound(format!(
                    "Reservation with id {} not found",
                    reservation.id
                )));
            }
        }
    }

    Ok(())
}

#[async_trait]
impl CirculationStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        self.read().map(|_| ())
    }

    async fn get_item(&self, id: Uuid) -> AppResult<CatalogItem> {
        self.read()?
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Catalog item with id {} not found", id)))
    }

    async fn list_items(&self) -> AppResult<Vec<CatalogItem>> {
        let mut items: Vec<_> = self.read()?.items.values().cloned().collect();
        items.sort_by_key(|i| (i.created_at, i.id));
        Ok(items)
    }

    async fn get_record(&self, id: Uuid) -> AppResult<CirculationRecord> {
        self.read()?
            .records
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    async fn get_reservation(&self, id: Uuid) -> AppResult<Reservation> {
        self.read()?
            .reservations
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    async fn open_record_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<CirculationRecord>> {
        Ok(self
            .read()?
            .records
            .values()
            .find(|r| r.is_open() && r.item_id == item_id && r.patron_id == patron_id)
            .cloned())
    }

    async fn active_reservation_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<Reservation>> {
        Ok(self
            .read()?
            .reservations
            .values()
            .find(|r| r.is_active() && r.item_id == item_id && r.patron_id == patron_id)
            .cloned())
    }

    async fn active_reservations_by_item(&self, item_id: Uuid) -> AppResult<Vec<Reservation>> {
        let mut queue: Vec<_> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.is_active() && r.item_id == item_id)
            .cloned()
            .collect();
        queue.sort_by(queue_order);
        Ok(queue)
    }

    async fn expired_reservations(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let mut expired: Vec<_> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.is_active() && r.is_expired_at(now))
            .cloned()
            .collect();
        expired.sort_by_key(|r| (r.item_id, r.expiry_date));
        Ok(expired)
    }

    async fn open_records_by_item(&self, item_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        let mut records: Vec<_> = self
            .read()?
            .records
            .values()
            .filter(|r| r.is_open() && r.item_id == item_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.issue_date, r.id));
        Ok(records)
    }

    async fn records_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        let mut records: Vec<_> = self
            .read()?
            .records
            .values()
            .filter(|r| r.patron_id == patron_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issue_date.cmp(&a.issue_date));
        Ok(records)
    }

    async fn reservations_by_patron(&self, patron_id: Uuid) -> AppResult<Vec<Reservation>> {
        let mut reservations: Vec<_> = self
            .read()?
            .reservations
            .values()
            .filter(|r| r.patron_id == patron_id)
            .cloned()
            .collect();
        reservations.sort_by(|a, b| b.reserved_date.cmp(&a.reserved_date));
        Ok(reservations)
    }

    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<CirculationRecord>> {
        let mut records: Vec<_> = self
            .read()?
            .records
            .values()
            .filter(|r| r.is_overdue(now))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.due_date, r.id));
        Ok(records)
    }

    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        let mut tables = self.write()?;
        check(&tables, &changes)?;

        match changes.item {
            Some(ItemWrite::Insert(item)) | Some(ItemWrite::Update { item, .. }) => {
                tables.items.insert(item.id, item);
            }
            None => {}
        }
        for write in changes.records {
            let (RowWrite::Insert(record) | RowWrite::Update(record)) = write;
            tables.records.insert(record.id, record);
        }
        for write in changes.reservations {
            let (RowWrite::Insert(reservation) | RowWrite::Update(reservation)) = write;
            tables.reservations.insert(reservation.id, reservation);
        }

        Ok(())
    }
}
