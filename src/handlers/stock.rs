use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::events::StockSnapshot;
use crate::handlers::AppState;
use crate::middleware_helpers::Actor;
use crate::quantity;
use crate::services::inventory::{InventoryTransactionView, StockLineView, TransactionFilter};
use crate::ApiResponse;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetStockRequest {
    /// Counted on-hand quantity
    #[schema(example = "20")]
    pub quantity: String,
}

pub fn branch_stock_routes() -> Router<AppState> {
    Router::new()
        .route("/:branch_id/stock", get(list_stock))
        .route("/:branch_id/stock/:product_id", put(set_stock))
}

pub fn transaction_routes() -> Router<AppState> {
    Router::new().route("/", get(list_transactions))
}

/// Record a manual stock count
#[utoipa::path(
    put,
    path = "/api/v1/branches/{branch_id}/stock/{product_id}",
    params(
        ("branch_id" = Uuid, Path, description = "Branch id"),
        ("product_id" = Uuid, Path, description = "Product id")
    ),
    request_body = SetStockRequest,
    responses(
        (status = 200, description = "Stock line after the count"),
        (status = 400, description = "Negative or malformed quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown branch or product", body = crate::errors::ErrorResponse),
        (status = 503, description = "Stock line busy, retry", body = crate::errors::ErrorResponse)
    ),
    tag = "stock"
)]
pub async fn set_stock(
    State(state): State<AppState>,
    Path((branch_id, product_id)): Path<(Uuid, Uuid)>,
    actor: Actor,
    Json(payload): Json<SetStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let counted = quantity::parse(&payload.quantity)?;
    let snapshot: StockSnapshot = state
        .services
        .inventory
        .set_stock(branch_id, product_id, counted, &actor)
        .await?;
    Ok(Json(ApiResponse::success(snapshot)))
}

#[utoipa::path(
    get,
    path = "/api/v1/branches/{branch_id}/stock",
    params(("branch_id" = Uuid, Path, description = "Branch id")),
    responses((status = 200, description = "Stock grid", body = [StockLineView])),
    tag = "stock"
)]
pub async fn list_stock(
    State(state): State<AppState>,
    Path(branch_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let lines = state.services.inventory.list_stock(branch_id).await?;
    Ok(Json(ApiResponse::success(lines)))
}

#[utoipa::path(
    get,
    path = "/api/v1/inventory-transactions",
    params(TransactionFilter),
    responses((status = 200, description = "Stock movements", body = [InventoryTransactionView])),
    tag = "stock"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let rows = state.services.inventory.list_transactions(filter).await?;
    Ok(Json(ApiResponse::success(rows)))
}
