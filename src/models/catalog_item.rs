//! Catalog item (copy-count record) model and the copy transaction table

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Lending status of a catalog item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum ItemStatus {
    Active = 0,
    Inactive = 1,
    Maintenance = 2,
    Retired = 3,
}

impl From<i16> for ItemStatus {
    fn from(v: i16) -> Self {
        match v {
            1 => ItemStatus::Inactive,
            2 => ItemStatus::Maintenance,
            3 => ItemStatus::Retired,
            _ => ItemStatus::Active,
        }
    }
}

impl From<ItemStatus> for i16 {
    fn from(s: ItemStatus) -> Self {
        s as i16
    }
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Active
    }
}

/// One of the five counters a copy can sit in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyBucket {
    Available,
    Borrowed,
    Reserved,
    Lost,
    Damaged,
}

impl std::fmt::Display for CopyBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CopyBucket::Available => "available",
            CopyBucket::Borrowed => "borrowed",
            CopyBucket::Reserved => "reserved",
            CopyBucket::Lost => "lost",
            CopyBucket::Damaged => "damaged",
        };
        write!(f, "{}", label)
    }
}

/// A single-copy movement between two buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CopyTransfer {
    pub from: CopyBucket,
    pub to: CopyBucket,
}

impl CopyTransfer {
    pub const fn new(from: CopyBucket, to: CopyBucket) -> Self {
        Self { from, to }
    }

    /// Signed per-bucket deltas of this transfer
    pub fn deltas(&self) -> [(CopyBucket, i32); 2] {
        [(self.from, -1), (self.to, 1)]
    }
}

/// Kinds of stock movement. Every kind resolves to exactly one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CopyTransaction {
    Issue,
    Return,
    ReportLost,
    ReportDamaged,
    Recover,
    Repair,
    ShelfLoss,
    ShelfDamage,
    SetAside,
    Release,
}

impl CopyTransaction {
    pub const ALL: [CopyTransaction; 10] = [
        CopyTransaction::Issue,
        CopyTransaction::Return,
        CopyTransaction::ReportLost,
        CopyTransaction::ReportDamaged,
        CopyTransaction::Recover,
        CopyTransaction::Repair,
        CopyTransaction::ShelfLoss,
        CopyTransaction::ShelfDamage,
        CopyTransaction::SetAside,
        CopyTransaction::Release,
    ];

    /// Transfer table. Adding a kind means adding a row here.
    pub const fn transfer(self) -> CopyTransfer {
        use CopyBucket::*;
        match self {
            CopyTransaction::Issue => CopyTransfer::new(Available, Borrowed),
            CopyTransaction::Return => CopyTransfer::new(Borrowed, Available),
            CopyTransaction::ReportLost => CopyTransfer::new(Borrowed, Lost),
            CopyTransaction::ReportDamaged => CopyTransfer::new(Borrowed, Damaged),
            CopyTransaction::Recover => CopyTransfer::new(Lost, Available),
            CopyTransaction::Repair => CopyTransfer::new(Damaged, Available),
            CopyTransaction::ShelfLoss => CopyTransfer::new(Available, Lost),
            CopyTransaction::ShelfDamage => CopyTransfer::new(Available, Damaged),
            CopyTransaction::SetAside => CopyTransfer::new(Available, Reserved),
            CopyTransaction::Release => CopyTransfer::new(Reserved, Available),
        }
    }

    /// Kinds that only the ledger may apply, because they pair with a loan record
    pub const fn is_loan_driven(self) -> bool {
        matches!(
            self,
            CopyTransaction::Issue
                | CopyTransaction::Return
                | CopyTransaction::ReportLost
                | CopyTransaction::ReportDamaged
        )
    }
}

/// Stock record of one lendable title
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CatalogItem {
    pub id: Uuid,
    pub total_copies: i32,
    pub available_copies: i32,
    pub borrowed_copies: i32,
    pub reserved_copies: i32,
    pub lost_copies: i32,
    pub damaged_copies: i32,
    pub status: ItemStatus,
    /// Optimistic concurrency counter, bumped on every committed change
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogItem {
    /// New ACTIVE item with every copy on the shelf
    pub fn new(total_copies: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_copies,
            available_copies: total_copies,
            borrowed_copies: 0,
            reserved_copies: 0,
            lost_copies: 0,
            damaged_copies: 0,
            status: ItemStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn count(&self, bucket: CopyBucket) -> i32 {
        match bucket {
            CopyBucket::Available => self.available_copies,
            CopyBucket::Borrowed => self.borrowed_copies,
            CopyBucket::Reserved => self.reserved_copies,
            CopyBucket::Lost => self.lost_copies,
            CopyBucket::Damaged => self.damaged_copies,
        }
    }

    pub(crate) fn count_mut(&mut self, bucket: CopyBucket) -> &mut i32 {
        match bucket {
            CopyBucket::Available => &mut self.available_copies,
            CopyBucket::Borrowed => &mut self.borrowed_copies,
            CopyBucket::Reserved => &mut self.reserved_copies,
            CopyBucket::Lost => &mut self.lost_copies,
            CopyBucket::Damaged => &mut self.damaged_copies,
        }
    }

    /// Sum of the five buckets, widened so corrupt values cannot overflow
    pub fn bucket_sum(&self) -> i64 {
        [
            self.available_copies,
            self.borrowed_copies,
            self.reserved_copies,
            self.lost_copies,
            self.damaged_copies,
        ]
        .iter()
        .map(|c| i64::from(*c))
        .sum()
    }

    /// `total = available + borrowed + reserved + lost + damaged`, all non-negative
    pub fn is_balanced(&self) -> bool {
        let non_negative = [
            self.available_copies,
            self.borrowed_copies,
            self.reserved_copies,
            self.lost_copies,
            self.damaged_copies,
        ]
        .iter()
        .all(|c| *c >= 0);

        non_negative && self.total_copies >= 1 && i64::from(self.total_copies) == self.bucket_sum()
    }

    pub fn is_lendable(&self) -> bool {
        self.status == ItemStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_transaction_moves_between_distinct_buckets() {
        for kind in CopyTransaction::ALL {
            let transfer = kind.transfer();
            assert_ne!(transfer.from, transfer.to, "{:?} is a no-op", kind);
            let net: i32 = transfer.deltas().iter().map(|(_, d)| d).sum();
            assert_eq!(net, 0);
        }
    }

    #[test]
    fn test_transfer_table_has_no_duplicate_rows() {
        let rows: HashSet<(CopyBucket, CopyBucket)> = CopyTransaction::ALL
            .iter()
            .map(|k| (k.transfer().from, k.transfer().to))
            .collect();
        assert_eq!(rows.len(), CopyTransaction::ALL.len());
    }

    #[test]
    fn test_new_item_is_balanced() {
        let item = CatalogItem::new(3, Utc::now());
        assert!(item.is_balanced());
        assert_eq!(item.count(CopyBucket::Available), 3);
        assert_eq!(item.status, ItemStatus::Active);
    }

    #[test]
    fn test_unbalanced_item_detected() {
        let mut item = CatalogItem::new(2, Utc::now());
        item.borrowed_copies = 1;
        assert!(!item.is_balanced());

        let mut item = CatalogItem::new(2, Utc::now());
        item.available_copies = 3;
        item.lost_copies = -1;
        assert!(!item.is_balanced());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ItemStatus::from(2), ItemStatus::Maintenance);
        assert_eq!(i16::from(ItemStatus::Retired), 3);
    }
}
