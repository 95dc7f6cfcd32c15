use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::customers::{CustomerView, NewCustomer};
use crate::ApiResponse;

#[derive(Debug, Deserialize, IntoParams)]
pub struct CustomerSearch {
    pub search: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PhoneLookup {
    pub phone: String,
}

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_customers).post(create_customer))
        .route("/lookup", get(lookup_customers))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers",
    params(CustomerSearch),
    responses((status = 200, description = "Customers", body = [CustomerView])),
    tag = "customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<CustomerSearch>,
) -> Result<impl IntoResponse, ServiceError> {
    let customers = state
        .services
        .customers
        .search(query.search.as_deref(), query.limit.unwrap_or(50))
        .await?;
    Ok(Json(ApiResponse::success(customers)))
}

#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = NewCustomer,
    responses(
        (status = 201, description = "Customer created", body = CustomerView),
        (status = 400, description = "Invalid customer", body = crate::errors::ErrorResponse)
    ),
    tag = "customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<NewCustomer>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state.services.customers.create(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(customer))))
}

/// Every customer registered under a phone number
#[utoipa::path(
    get,
    path = "/api/v1/customers/lookup",
    params(PhoneLookup),
    responses((status = 200, description = "Matching customers", body = [CustomerView])),
    tag = "customers"
)]
pub async fn lookup_customers(
    State(state): State<AppState>,
    Query(query): Query<PhoneLookup>,
) -> Result<impl IntoResponse, ServiceError> {
    let matches = state.services.customers.lookup_by_phone(&query.phone).await?;
    Ok(Json(ApiResponse::success(matches)))
}
