//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, Pool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult, ErrorCode},
    models::{Reservation, ReservationStatus},
};

const ACTIVE_HOLD_INDEX: &str = "reservations_active_pair_idx";

const RESERVATION_COLUMNS: &str = r#"
    id, item_id, patron_id, reserved_date, expiry_date, pickup_date, status, priority, loan_id
"#;

fn reservation_from_row(row: &PgRow) -> Reservation {
    Reservation {
        id: row.get("id"),
        item_id: row.get("item_id"),
        patron_id: row.get("patron_id"),
        reserved_date: row.get("reserved_date"),
        expiry_date: row.get("expiry_date"),
        pickup_date: row.get("pickup_date"),
        status: row.get::<i16, _>("status").into(),
        priority: row.get("priority"),
        loan_id: row.get("loan_id"),
    }
}

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get reservation by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Reservation> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;

        Ok(reservation_from_row(&row))
    }

    /// Active hold of a patron on an item
    pub async fn active_for(&self, item_id: Uuid, patron_id: Uuid) -> AppResult<Option<Reservation>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE item_id = $1 AND patron_id = $2 AND status = $3",
            RESERVATION_COLUMNS
        ))
        .bind(item_id)
        .bind(patron_id)
        .bind(i16::from(ReservationStatus::Active))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(reservation_from_row))
    }

    /// Active holds of an item in serving order
    pub async fn active_by_item(&self, item_id: Uuid) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE item_id = $1 AND status = $2 ORDER BY reserved_date, priority, id",
            RESERVATION_COLUMNS
        ))
        .bind(item_id)
        .bind(i16::from(ReservationStatus::Active))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(reservation_from_row).collect())
    }

    /// Active holds whose expiry has passed
    pub async fn expired(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE status = $1 AND expiry_date < $2 ORDER BY item_id, expiry_date",
            RESERVATION_COLUMNS
        ))
        .bind(i16::from(ReservationStatus::Active))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(reservation_from_row).collect())
    }

    /// Reservation history of a patron, newest first
    pub async fn by_patron(&self, patron_id: Uuid) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM reservations WHERE patron_id = $1 ORDER BY reserved_date DESC",
            RESERVATION_COLUMNS
        ))
        .bind(patron_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(reservation_from_row).collect())
    }

    pub(crate) async fn insert(tx: &mut Transaction<'static, Postgres>, reservation: &Reservation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, item_id, patron_id, reserved_date, expiry_date, pickup_date, status, priority, loan_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.item_id)
        .bind(reservation.patron_id)
        .bind(reservation.reserved_date)
        .bind(reservation.expiry_date)
        .bind(reservation.pickup_date)
        .bind(i16::from(reservation.status))
        .bind(reservation.priority)
        .bind(reservation.loan_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|d| d.constraint())
                .is_some_and(|c| c == ACTIVE_HOLD_INDEX);
            if duplicate {
                AppError::Conflict(
                    ErrorCode::DuplicateReservation,
                    format!(
                        "Patron {} already holds a reservation on item {}",
                        reservation.patron_id, reservation.item_id
                    ),
                )
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    pub(crate) async fn update(tx: &mut Transaction<'static, Postgres>, reservation: &Reservation) -> AppResult<()> {
        let rows_affected = sqlx::query(
            "UPDATE reservations SET pickup_date = $2, status = $3, loan_id = $4 WHERE id = $1",
        )
        .bind(reservation.id)
        .bind(reservation.pickup_date)
        .bind(i16::from(reservation.status))
        .bind(reservation.loan_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!(
                "Reservation with id {} not found",
                reservation.id
            )));
        }

        Ok(())
    }
}
