//! Catalog items repository for database operations

use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::CatalogItem,
};

use super::stale_item;

const ITEM_COLUMNS: &str = r#"
    id, total_copies, available_copies, borrowed_copies, reserved_copies,
    lost_copies, damaged_copies, status, version, created_at, updated_at
"#;

fn item_from_row(row: &PgRow) -> CatalogItem {
    CatalogItem {
        id: row.get("id"),
        total_copies: row.get("total_copies"),
        available_copies: row.get("available_copies"),
        borrowed_copies: row.get("borrowed_copies"),
        reserved_copies: row.get("reserved_copies"),
        lost_copies: row.get("lost_copies"),
        damaged_copies: row.get("damaged_copies"),
        status: row.get::<i16, _>("status").into(),
        version: row.get("version"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[derive(Clone)]
pub struct ItemsRepository {
    pool: Pool<Postgres>,
}

impl ItemsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get item by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<CatalogItem> {
        let row = sqlx::query(&format!("SELECT {} FROM catalog_items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Catalog item with id {} not found", id)))?;

        Ok(item_from_row(&row))
    }

    /// List all items, oldest first
    pub async fn list(&self) -> AppResult<Vec<CatalogItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM catalog_items ORDER BY created_at, id",
            ITEM_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(item_from_row).collect())
    }

    pub(crate) async fn insert(tx: &mut Transaction<'static, Postgres>, item: &CatalogItem) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO catalog_items (
                id, total_copies, available_copies, borrowed_copies, reserved_copies,
                lost_copies, damaged_copies, status, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(item.id)
        .bind(item.total_copies)
        .bind(item.available_copies)
        .bind(item.borrowed_copies)
        .bind(item.reserved_copies)
        .bind(item.lost_copies)
        .bind(item.damaged_copies)
        .bind(i16::from(item.status))
        .bind(item.version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Compare-and-set update on the version column
    pub(crate) async fn update_versioned(
        tx: &mut Transaction<'static, Postgres>,
        item: &CatalogItem,
        expected_version: i64,
    ) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE catalog_items SET
                total_copies = $2, available_copies = $3, borrowed_copies = $4,
                reserved_copies = $5, lost_copies = $6, damaged_copies = $7,
                status = $8, version = $9, updated_at = $10
            WHERE id = $1 AND version = $11
            "#,
        )
        .bind(item.id)
        .bind(item.total_copies)
        .bind(item.available_copies)
        .bind(item.borrowed_copies)
        .bind(item.reserved_copies)
        .bind(item.lost_copies)
        .bind(item.damaged_copies)
        .bind(i16::from(item.status))
        .bind(item.version)
        .bind(item.updated_at)
        .bind(expected_version)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(stale_item(item.id));
        }

        Ok(())
    }
}
