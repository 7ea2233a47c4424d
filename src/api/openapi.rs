//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, items, loans, reservations};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Elidune Circulation API",
        version = "1.1.0",
        description = "Loans, returns, reservations and copy counts of a library catalog",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html"),
        contact(name = "Elidune Team", email = "contact@elidune.org")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Items
        items::list_items,
        items::register_item,
        items::get_item,
        items::set_status,
        items::retire_item,
        items::transfer_copy,
        items::apply_transaction,
        items::availability,
        items::queue,
        items::fulfill_next,
        // Loans
        loans::issue,
        loans::get_loan,
        loans::extend,
        loans::return_item,
        loans::settle_fine,
        loans::overdue_loans,
        loans::patron_loans,
        // Reservations
        reservations::reserve,
        reservations::get_reservation,
        reservations::cancel,
        reservations::patron_reservations,
        reservations::sweep_expired,
    ),
    components(
        schemas(
            // Items
            crate::models::CatalogItem,
            crate::models::ItemStatus,
            crate::models::CopyBucket,
            crate::models::CopyTransaction,
            items::RegisterItemRequest,
            items::SetStatusRequest,
            items::TransferRequest,
            items::TransactionRequest,
            items::AvailabilityQuery,
            items::AvailabilityResponse,
            crate::services::gate::GateDecision,
            crate::services::gate::GateReason,
            // Loans
            crate::models::CirculationRecord,
            crate::models::CirculationStatus,
            crate::models::ReturnCondition,
            crate::models::ReturnReceipt,
            crate::models::Fulfillment,
            loans::IssueRequest,
            loans::ExtendRequest,
            loans::ReturnRequest,
            // Reservations
            crate::models::Reservation,
            crate::models::ReservationStatus,
            crate::models::SweepReport,
            reservations::ReserveRequest,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorCode,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "items", description = "Catalog items and copy counts"),
        (name = "loans", description = "Loan ledger"),
        (name = "reservations", description = "Reservation queue")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
