//! Circulation records repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{CirculationRecord, CirculationStatus},
};

const RECORD_COLUMNS: &str = r#"
    id, item_id, patron_id, issue_date, due_date, extended_date, extension_count,
    return_date, status, fine_amount, fine_paid
"#;

/// Partial unique index guarding one open loan per (item, patron)
const OPEN_LOAN_INDEX: &str = "circulation_records_open_pair_idx";

fn record_from_row(row: &PgRow) -> CirculationRecord {
    CirculationRecord {
        id: row.get("id"),
        item_id: row.get("item_id"),
        patron_id: row.get("patron_id"),
        issue_date: row.get("issue_date"),
        due_date: row.get("due_date"),
        extended_date: row.get("extended_date"),
        extension_count: row.get("extension_count"),
        return_date: row.get("return_date"),
        status: row.get::<i16, _>("status").into(),
        fine_amount: row.get("fine_amount"),
        fine_paid: row.get("fine_paid"),
    }
}

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<CirculationRecord> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM circulation_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        Ok(record_from_row(&row))
    }

    /// Open loan of a patron on an item
    pub async fn open_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<CirculationRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM circulation_records WHERE item_id = $1 AND patron_id = $2 AND status = ANY($3)",
            RECORD_COLUMNS
        ))
        .bind(item_id)
        .bind(patron_id)
        .bind(&CirculationStatus::OPEN_CODES[..])
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row))
    }

    /// Open loans on an item
    pub async fn open_by_item(&self, item_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM circulation_records WHERE item_id = $1 AND status = ANY($2) ORDER BY issue_date",
            RECORD_COLUMNS
        ))
        .bind(item_id)
        .bind(&CirculationStatus::OPEN_CODES[..])
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Loan history of a patron, newest first
    pub async fn by_patron(&self, patron_id: Uuid) -> AppResult<Vec<CirculationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM circulation_records WHERE patron_id = $1 ORDER BY issue_date DESC",
            RECORD_COLUMNS
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    /// Open loans past their due date
    pub async fn overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<CirculationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM circulation_records WHERE status = ANY($1) AND due_date < $2 ORDER BY due_date",
            RECORD_COLUMNS
        ))
        .bind(&CirculationStatus::OPEN_CODES[..])
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    pub(crate) async fn insert(tx: &mut Transaction<'static, Postgres>, record: &CirculationRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO circulation_records (
                id, item_id, patron_id, issue_date, due_date, extended_date, extension_count,
                return_date, status, fine_amount, fine_paid
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(record.item_id)
        .bind(record.patron_id)
        .bind(record.issue_date)
        .bind(record.due_date)
        .bind(record.extended_date)
        .bind(record.extension_count)
        .bind(record.return_date)
        .bind(i16::from(record.status))
        .bind(record.fine_amount)
        .bind(record.fine_paid)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            let constraint = e
                .as_database_error()
                .and_then(|d| d.constraint())
                .map(str::to_owned);
            duplicate_or_database(e, constraint.as_deref(), record)
        })?;

        Ok(())
    }

    pub(crate) async fn update(tx: &mut Transaction<'static, Postgres>, record: &CirculationRecord) -> AppResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE circulation_records SET
                due_date = $2, extended_date = $3, extension_count = $4,
                return_date = $5, status = $6, fine_amount = $7, fine_paid = $8
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.due_date)
        .bind(record.extended_date)
        .bind(record.extension_count)
        .bind(record.return_date)
        .bind(i16::from(record.status))
        .bind(record.fine_amount)
        .bind(record.fine_paid)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Loan with id {} not found", record.id)));
        }

        Ok(())
    }
}

fn duplicate_or_database(e: sqlx::Error, constraint: Option<&str>, record: &CirculationRecord) -> AppError {
    match constraint {
        Some(OPEN_LOAN_INDEX) => AppError::Conflict(
            ErrorCode::DuplicateLoan,
            format!(
                "Patron {} already has an open loan on item {}",
                record.patron_id, record.item_id
            ),
        ),
        _ => AppError::Database(e),
    }
}
