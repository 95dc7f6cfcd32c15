use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::events::ControlAction;
use crate::handlers::AppState;
use crate::ApiResponse;

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderNumberResponse {
    pub order_number: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AnnounceRequest {
    #[schema(value_type = String, example = "new")]
    pub action: ControlAction,
    pub branch_name: Option<String>,
}

pub fn order_number_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(issue_order_number))
        .route("/:number/announce", post(announce_order))
}

#[utoipa::path(
    post,
    path = "/api/v1/order-numbers",
    responses((status = 201, description = "Next order number", body = OrderNumberResponse)),
    tag = "order-numbers"
)]
pub async fn issue_order_number(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let order_number = state.services.order_sequence.next_order_number().await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(OrderNumberResponse { order_number })),
    ))
}

/// Push an order to the production control room
#[utoipa::path(
    post,
    path = "/api/v1/order-numbers/{number}/announce",
    params(("number" = i64, Path, description = "Issued order number")),
    request_body = AnnounceRequest,
    responses(
        (status = 202, description = "Announcement queued"),
        (status = 404, description = "Number never issued", body = crate::errors::ErrorResponse)
    ),
    tag = "order-numbers"
)]
pub async fn announce_order(
    State(state): State<AppState>,
    Path(number): Path<i64>,
    Json(payload): Json<AnnounceRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .order_sequence
        .announce(number, payload.action, payload.branch_name)
        .await?;
    Ok(StatusCode::ACCEPTED)
}
