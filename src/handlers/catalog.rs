use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::catalog::ProductView;
use crate::ApiResponse;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductQuery {
    /// Only products that can currently be reserved
    #[serde(default)]
    pub available: bool,
}

pub fn branch_routes() -> Router<AppState> {
    Router::new().route("/", get(list_branches))
}

pub fn product_routes() -> Router<AppState> {
    Router::new().route("/", get(list_products))
}

#[utoipa::path(get, path = "/api/v1/branches", responses((status = 200, description = "Branches")), tag = "catalog")]
pub async fn list_branches(State(state): State<AppState>) -> Result<impl IntoResponse, ServiceError> {
    let branches = state.services.catalog.list_branches().await?;
    Ok(Json(ApiResponse::success(branches)))
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductQuery),
    responses((status = 200, description = "Products", body = [ProductView])),
    tag = "catalog"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.catalog.list_products(query.available).await?;
    Ok(Json(ApiResponse::success(products)))
}
