//! API handlers for the circulation REST endpoints

pub mod health;
pub mod items;
pub mod loans;
pub mod openapi;
pub mod reservations;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use validator::Validate;

use crate::{error::AppError, AppState};

/// Run the derived validation rules of a request body
pub(crate) fn validated<T: Validate>(request: T) -> Result<T, AppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(request)
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Catalog items
        .route("/items", get(items::list_items).post(items::register_item))
        .route("/items/:id", get(items::get_item))
        .route("/items/:id/status", put(items::set_status))
        .route("/items/:id/retire", post(items::retire_item))
        .route("/items/:id/transfers", post(items::transfer_copy))
        .route("/items/:id/transactions", post(items::apply_transaction))
        .route("/items/:id/availability", get(items::availability))
        .route("/items/:id/queue", get(items::queue))
        .route("/items/:id/fulfill", post(items::fulfill_next))
        // Loans
        .route("/loans", post(loans::issue))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/extend", post(loans::extend))
        .route("/loans/:id/return", post(loans::return_item))
        .route("/loans/:id/settle", post(loans::settle_fine))
        .route("/overdue-loans", get(loans::overdue_loans))
        .route("/patrons/:id/loans", get(loans::patron_loans))
        // Reservations
        .route("/reservations", post(reservations::reserve))
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel))
        .route("/patrons/:id/reservations", get(reservations::patron_reservations))
        .route("/sweeps", post(reservations::sweep_expired))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
