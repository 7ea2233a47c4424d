//! Patron directory backed by PostgreSQL.
//!
//! The `patrons` table is maintained by the membership system; this side only
//! reads it. Loan counts come from the circulation tables.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{CirculationStatus, PatronEligibility},
    services::{clock::Clock, patrons::PatronDirectory},
};

#[derive(Clone)]
pub struct PatronsRepository {
    pool: Pool<Postgres>,
    clock: Arc<dyn Clock>,
    default_max_loans: u32,
}

impl PatronsRepository {
    pub fn new(pool: Pool<Postgres>, clock: Arc<dyn Clock>, default_max_loans: u32) -> Self {
        Self {
            pool,
            clock,
            default_max_loans,
        }
    }
}

#[async_trait]
impl PatronDirectory for PatronsRepository {
    async fn get_eligibility(&self, patron_id: Uuid) -> AppResult<PatronEligibility> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM circulation_records
                 WHERE patron_id = $1 AND status = ANY($2)) AS active_loans,
                EXISTS(SELECT 1 FROM circulation_records
                       WHERE patron_id = $1 AND status = ANY($2) AND due_date < $3) AS has_overdue,
                (SELECT max_concurrent_loans FROM patrons WHERE id = $1) AS max_loans
            "#,
        )
        .bind(patron_id)
        .bind(&CirculationStatus::OPEN_CODES[..])
        .bind(self.clock.now())
        .fetch_one(&self.pool)
        .await?;

        let active_loans: i64 = row.get("active_loans");
        let max_loans: Option<i32> = row.get("max_loans");

        Ok(PatronEligibility {
            active_loan_count: u32::try_from(active_loans).unwrap_or(u32::MAX),
            has_overdue_loan: row.get("has_overdue"),
            max_concurrent_loans: max_loans
                .and_then(|m| u32::try_from(m).ok())
                .unwrap_or(self.default_max_loans),
        })
    }

    async fn contact_email(&self, patron_id: Uuid) -> AppResult<Option<String>> {
        let email: Option<Option<String>> =
            sqlx::query_scalar("SELECT email FROM patrons WHERE id = $1")
                .bind(patron_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(email.flatten())
    }
}
