use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::reservation::{DeliveryType, ReservationStatus};
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::middleware_helpers::Actor;
use crate::quantity;
use crate::services::customers::{CustomerChoice, CustomerInput};
use crate::services::reservations::{NewReservation, ReservationFilter, ReservationView};
use crate::ApiResponse;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateReservationRequest {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    /// As typed by the operator, e.g. `"2"` or `"1.25"`
    #[schema(example = "2")]
    pub quantity: String,
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub customer: CustomerInput,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveConflictRequest {
    pub product_id: Uuid,
    pub branch_id: Uuid,
    #[schema(example = "2")]
    pub quantity: String,
    pub delivery_type: DeliveryType,
    pub resolution: CustomerChoice,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: ReservationStatus,
}

fn new_reservation(
    product_id: Uuid,
    branch_id: Uuid,
    raw_quantity: &str,
    delivery_type: DeliveryType,
) -> Result<NewReservation, ServiceError> {
    Ok(NewReservation {
        product_id,
        branch_id,
        quantity: quantity::parse(raw_quantity)?,
        delivery_type,
    })
}

pub fn reservation_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reservations).post(create_reservation))
        .route("/resolve-conflict", post(resolve_conflict))
        .route("/:id", get(get_reservation))
        .route("/:id/status", put(update_status))
}

/// Create a pending reservation and debit stock
#[utoipa::path(
    post,
    path = "/api/v1/reservations",
    request_body = CreateReservationRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationView),
        (status = 400, description = "Invalid quantity or missing actor", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown branch or product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Phone matches other customers; resolve the conflict", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 503, description = "Stock line busy, retry", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = new_reservation(
        payload.product_id,
        payload.branch_id,
        &payload.quantity,
        payload.delivery_type,
    )?;
    let view = state
        .services
        .reservations
        .create_reservation(input, payload.customer, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(view))))
}

/// Create a reservation after the operator settled a customer conflict
#[utoipa::path(
    post,
    path = "/api/v1/reservations/resolve-conflict",
    request_body = ResolveConflictRequest,
    responses(
        (status = 201, description = "Reservation created", body = ReservationView),
        (status = 404, description = "Chosen customer not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn resolve_conflict(
    State(state): State<AppState>,
    actor: Actor,
    Json(payload): Json<ResolveConflictRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = new_reservation(
        payload.product_id,
        payload.branch_id,
        &payload.quantity,
        payload.delivery_type,
    )?;
    let view = state
        .services
        .reservations
        .resolve_conflict(input, payload.resolution, &actor)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(view))))
}

/// Confirm or cancel a reservation
#[utoipa::path(
    put,
    path = "/api/v1/reservations/{id}/status",
    params(("id" = Uuid, Path, description = "Reservation id")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = ReservationView),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse),
        (status = 422, description = "Not enough stock to re-confirm", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    actor: Actor,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state
        .services
        .reservations
        .transition_status(id, payload.status, &actor)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}

#[utoipa::path(
    get,
    path = "/api/v1/reservations/{id}",
    params(("id" = Uuid, Path, description = "Reservation id")),
    responses(
        (status = 200, description = "Reservation", body = ReservationView),
        (status = 404, description = "Reservation not found", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let view = state.services.reservations.get(id).await?;
    Ok(Json(ApiResponse::success(view)))
}

/// Reservations created in a date range, newest first
#[utoipa::path(
    get,
    path = "/api/v1/reservations",
    params(ReservationFilter),
    responses(
        (status = 200, description = "Reservations", body = [ReservationView]),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse)
    ),
    tag = "reservations"
)]
pub async fn list_reservations(
    State(state): State<AppState>,
    Query(filter): Query<ReservationFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let views = state.services.reservations.list(filter).await?;
    Ok(Json(ApiResponse::success(views)))
}
