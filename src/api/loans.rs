//! Loan endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{CirculationRecord, ReturnCondition, ReturnReceipt},
    AppState,
};

use super::validated;

/// Issue loan request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueRequest {
    pub item_id: Uuid,
    pub patron_id: Uuid,
    /// Defaults to the configured loan period
    #[validate(range(min = 1, max = 3650, message = "Loan period must be between 1 and 3650 days"))]
    pub loan_period_days: Option<i64>,
}

/// Extend loan request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtendRequest {
    pub new_due_date: DateTime<Utc>,
}

/// Return request. An empty body means a copy in good condition.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReturnRequest {
    #[serde(default)]
    pub condition: ReturnCondition,
}

/// Lend an item to a patron
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    request_body = IssueRequest,
    responses(
        (status = 201, description = "Loan created", body = CirculationRecord),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "No copy available, item inactive or duplicate loan", body = crate::error::ErrorResponse),
        (status = 422, description = "Patron over the loan limit or overdue", body = crate::error::ErrorResponse)
    )
)]
pub async fn issue(
    State(state): State<AppState>,
    Json(request): Json<IssueRequest>,
) -> AppResult<(StatusCode, Json<CirculationRecord>)> {
    let request = validated(request)?;
    let period = request
        .loan_period_days
        .unwrap_or(state.config.circulation.loan_period_days);

    let record = state
        .services
        .ledger
        .issue(request.item_id, request.patron_id, period)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Get loan by ID
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = CirculationRecord),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CirculationRecord>> {
    let record = state.services.ledger.get_record(id).await?;
    Ok(Json(record))
}

/// Extend a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/extend",
    tag = "loans",
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    request_body = ExtendRequest,
    responses(
        (status = 200, description = "Loan extended", body = CirculationRecord),
        (status = 400, description = "Due date not moved forward", body = crate::error::ErrorResponse),
        (status = 409, description = "Loan closed or patrons waiting", body = crate::error::ErrorResponse),
        (status = 422, description = "Extension limit reached", body = crate::error::ErrorResponse)
    )
)]
pub async fn extend(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ExtendRequest>,
) -> AppResult<Json<CirculationRecord>> {
    let record = state.services.ledger.extend(id, request.new_due_date).await?;
    Ok(Json(record))
}

/// Return a borrowed copy
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Loan closed", body = ReturnReceipt),
        (status = 404, description = "Loan not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Loan already closed", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<ReturnRequest>>,
) -> AppResult<Json<ReturnReceipt>> {
    let condition = request
        .map(|Json(request)| request.condition)
        .unwrap_or_default();
    let receipt = state.services.ledger.return_item(id, condition).await?;
    Ok(Json(receipt))
}

/// Mark the fine of a closed loan as paid
#[utoipa::path(
    post,
    path = "/loans/{id}/settle",
    tag = "loans",
    params(
        ("id" = Uuid, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Fine settled", body = CirculationRecord),
        (status = 400, description = "No fine owed", body = crate::error::ErrorResponse),
        (status = 409, description = "Loan open or fine already settled", body = crate::error::ErrorResponse)
    )
)]
pub async fn settle_fine(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CirculationRecord>> {
    let record = state.services.ledger.settle_fine(id).await?;
    Ok(Json(record))
}

/// Open loans past their due date
#[utoipa::path(
    get,
    path = "/overdue-loans",
    tag = "loans",
    responses(
        (status = 200, description = "Overdue loans", body = Vec<CirculationRecord>)
    )
)]
pub async fn overdue_loans(State(state): State<AppState>) -> AppResult<Json<Vec<CirculationRecord>>> {
    let records = state.services.ledger.overdue_loans().await?;
    Ok(Json(records))
}

/// Loans of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/loans",
    tag = "loans",
    params(
        ("id" = Uuid, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Loans of the patron", body = Vec<CirculationRecord>)
    )
)]
pub async fn patron_loans(
    State(state): State<AppState>,
    Path(patron_id): Path<Uuid>,
) -> AppResult<Json<Vec<CirculationRecord>>> {
    let records = state.services.ledger.patron_loans(patron_id).await?;
    Ok(Json(records))
}
