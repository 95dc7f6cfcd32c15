use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Branch Reservations API",
        version = "0.3.0",
        description = r#"
# Branch Reservations API

Phone-order reservations against per-branch stock for a multi-branch sweets retailer.

## Acting user

Mutating endpoints read the operator from headers set by the upstream access layer:

- `x-actor`: username, recorded on reservations and stock movements
- `x-actor-role`: `admin` selects the admin audit fields on status changes

## Errors

Every error body carries `error`, `message`, optional `details`, `request_id` and `timestamp`.

- `422` insufficient stock, `details.available` holds the quantity on hand
- `409` invalid status transition, or a customer conflict listing `details.candidates`
- `503` the stock line stayed locked too long; retry the whole request

## Live updates

`GET /ws/{topic}` streams JSON messages for `callcenter_updates`, `branch_updates`,
`reservations_updates` and `control_updates`. Quantities are decimal strings.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "reservations", description = "Reservation lifecycle"),
        (name = "stock", description = "Stock counts and movement log"),
        (name = "customers", description = "Customer records"),
        (name = "catalog", description = "Branches and products"),
        (name = "order-numbers", description = "Daily-request order numbers")
    ),
    paths(
        crate::handlers::reservations::create_reservation,
        crate::handlers::reservations::resolve_conflict,
        crate::handlers::reservations::update_status,
        crate::handlers::reservations::get_reservation,
        crate::handlers::reservations::list_reservations,

        crate::handlers::stock::set_stock,
        crate::handlers::stock::list_stock,
        crate::handlers::stock::list_transactions,

        crate::handlers::customers::list_customers,
        crate::handlers::customers::create_customer,
        crate::handlers::customers::lookup_customers,

        crate::handlers::catalog::list_branches,
        crate::handlers::catalog::list_products,

        crate::handlers::order_numbers::issue_order_number,
        crate::handlers::order_numbers::announce_order,
    ),
    components(
        schemas(
            crate::handlers::reservations::CreateReservationRequest,
            crate::handlers::reservations::ResolveConflictRequest,
            crate::handlers::reservations::UpdateStatusRequest,
            crate::services::reservations::ReservationView,

            crate::handlers::stock::SetStockRequest,
            crate::services::inventory::StockLineView,
            crate::services::inventory::InventoryTransactionView,

            crate::services::customers::CustomerView,
            crate::services::customers::NewCustomer,
            crate::services::customers::CustomerInput,
            crate::services::customers::CustomerChoice,
            crate::services::customers::CustomerConflict,

            crate::services::catalog::ProductView,

            crate::handlers::order_numbers::OrderNumberResponse,
            crate::handlers::order_numbers::AnnounceRequest,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
