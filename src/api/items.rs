//! Catalog item endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::{CatalogItem, CopyBucket, CopyTransaction, Fulfillment, ItemStatus, Reservation},
    services::gate::GateDecision,
    AppState,
};

use super::validated;

/// Register item request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterItemRequest {
    /// Number of copies owned
    #[validate(range(min = 1, message = "An item needs at least one copy"))]
    pub total_copies: i32,
}

/// Status change request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStatusRequest {
    pub status: ItemStatus,
}

/// Move one copy between two buckets
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub from: CopyBucket,
    pub to: CopyBucket,
}

/// Apply a stock movement by kind
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransactionRequest {
    pub kind: CopyTransaction,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AvailabilityQuery {
    /// Patron asking
    pub patron_id: Uuid,
}

/// Gate decisions for one patron and one item
#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub item: CatalogItem,
    pub issue: GateDecision,
    pub reserve: GateDecision,
}

/// List catalog items
#[utoipa::path(
    get,
    path = "/items",
    tag = "items",
    responses(
        (status = 200, description = "All catalog items", body = Vec<CatalogItem>)
    )
)]
pub async fn list_items(State(state): State<AppState>) -> AppResult<Json<Vec<CatalogItem>>> {
    let items = state.services.registry.list_items().await?;
    Ok(Json(items))
}

/// Register a new item
#[utoipa::path(
    post,
    path = "/items",
    tag = "items",
    request_body = RegisterItemRequest,
    responses(
        (status = 201, description = "Item registered", body = CatalogItem),
        (status = 400, description = "Invalid copy count", body = crate::error::ErrorResponse)
    )
)]
pub async fn register_item(
    State(state): State<AppState>,
    Json(request): Json<RegisterItemRequest>,
) -> AppResult<(StatusCode, Json<CatalogItem>)> {
    let request = validated(request)?;
    let item = state.services.registry.register_item(request.total_copies).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Get item by ID
#[utoipa::path(
    get,
    path = "/items/{id}",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item details", body = CatalogItem),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CatalogItem>> {
    let item = state.services.registry.get_item(id).await?;
    Ok(Json(item))
}

/// Change the lending status of an item
#[utoipa::path(
    put,
    path = "/items/{id}/status",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    request_body = SetStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = CatalogItem),
        (status = 400, description = "Retirement requested", body = crate::error::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> AppResult<Json<CatalogItem>> {
    let item = state.services.registry.set_status(id, request.status).await?;
    Ok(Json(item))
}

/// Retire an item
#[utoipa::path(
    post,
    path = "/items/{id}/retire",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Item retired", body = CatalogItem),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Loans or reservations outstanding", body = crate::error::ErrorResponse)
    )
)]
pub async fn retire_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<CatalogItem>> {
    let item = state.services.registry.retire_item(id).await?;
    Ok(Json(item))
}

/// Move one copy between buckets
#[utoipa::path(
    post,
    path = "/items/{id}/transfers",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Copy moved", body = CatalogItem),
        (status = 400, description = "Source equals destination", body = crate::error::ErrorResponse),
        (status = 409, description = "Source bucket empty", body = crate::error::ErrorResponse)
    )
)]
pub async fn transfer_copy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransferRequest>,
) -> AppResult<Json<CatalogItem>> {
    let item = state
        .services
        .registry
        .transfer_copy(id, request.from, request.to)
        .await?;
    Ok(Json(item))
}

/// Apply a staff stock movement
#[utoipa::path(
    post,
    path = "/items/{id}/transactions",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    request_body = TransactionRequest,
    responses(
        (status = 200, description = "Movement applied", body = CatalogItem),
        (status = 400, description = "Movement reserved to the loan ledger", body = crate::error::ErrorResponse),
        (status = 409, description = "Source bucket empty", body = crate::error::ErrorResponse)
    )
)]
pub async fn apply_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransactionRequest>,
) -> AppResult<Json<CatalogItem>> {
    let item = state
        .services
        .registry
        .apply_transaction(id, request.kind)
        .await?;
    Ok(Json(item))
}

/// Could a patron borrow or reserve this item now?
#[utoipa::path(
    get,
    path = "/items/{id}/availability",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID"),
        AvailabilityQuery
    ),
    responses(
        (status = 200, description = "Gate decisions", body = AvailabilityResponse),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let gate = &state.services.gate;
    let issue = gate.check_issue(id, query.patron_id).await?;
    let reserve = gate.check_reserve(id, query.patron_id).await?;
    let item = state.services.registry.get_item(id).await?;

    Ok(Json(AvailabilityResponse {
        item,
        issue,
        reserve,
    }))
}

/// Reservation queue of an item
#[utoipa::path(
    get,
    path = "/items/{id}/queue",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Active reservations in serving order", body = Vec<Reservation>),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn queue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<Reservation>>> {
    let queue = state.services.reservations.queue_for_item(id).await?;
    Ok(Json(queue))
}

/// Give an available copy to the next waiting patron
#[utoipa::path(
    post,
    path = "/items/{id}/fulfill",
    tag = "items",
    params(
        ("id" = Uuid, Path, description = "Item ID")
    ),
    responses(
        (status = 200, description = "Fulfilled hold, or null when nobody qualified", body = Option<Fulfillment>),
        (status = 404, description = "Item not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn fulfill_next(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Option<Fulfillment>>> {
    let fulfillment = state.services.reservations.fulfill_next(id).await?;
    Ok(Json(fulfillment))
}
