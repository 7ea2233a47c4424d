//! Reservation endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{Reservation, SweepReport},
    AppState,
};

use super::validated;

/// Place reservation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReserveRequest {
    pub item_id: Uuid,
    pub patron_id: Uuid,
    /// Defaults to the configured hold period
    #[validate(range(min = 1, max = 3650, message = "Hold period must be between 1 and 3650 days"))]
    pub hold_period_days: Option<i64>,
}

/// Place a hold on an item
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation placed", body = Reservation),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Copies on the shelf, duplicate hold or loan", body = crate::error::ErrorResponse),
        (status = 422, description = "Patron over the loan limit or overdue", body = crate::error::ErrorResponse)
    )
)]
pub async fn reserve(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let request = validated(request)?;
    let period = request
        .hold_period_days
        .unwrap_or(state.config.circulation.hold_period_days);

    let reservation = state
        .services
        .reservations
        .reserve(request.item_id, request.patron_id, period)
        .await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Get reservation by ID
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    params(
        ("id" = Uuid, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = Reservation),
        (status = 404, description = "Reservation not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.get_reservation(id).await?;
    Ok(Json(reservation))
}

/// Cancel an active reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    params(
        ("id" = Uuid, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 404, description = "Reservation not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Reservation no longer active", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reservation>> {
    let reservation = state.services.reservations.cancel(id).await?;
    Ok(Json(reservation))
}

/// Reservations of a patron
#[utoipa::path(
    get,
    path = "/patrons/{id}/reservations",
    tag = "reservations",
    params(
        ("id" = Uuid, Path, description = "Patron ID")
    ),
    responses(
        (status = 200, description = "Reservations of the patron", body = Vec<Reservation>)
    )
)]
pub async fn patron_reservations(
    State(state): State<AppState>,
    Path(patron_id): Path<Uuid>,
) -> AppResult<Json<Vec<Reservation>>> {
    let reservations = state
        .services
        .reservations
        .patron_reservations(patron_id)
        .await?;
    Ok(Json(reservations))
}

/// Expire overdue holds now instead of waiting for the next scheduled sweep
#[utoipa::path(
    post,
    path = "/sweeps",
    tag = "reservations",
    responses(
        (status = 200, description = "Sweep report", body = SweepReport)
    )
)]
pub async fn sweep_expired(State(state): State<AppState>) -> AppResult<Json<SweepReport>> {
    let report = state.services.reservations.sweep_expired().await?;
    Ok(Json(report))
}
