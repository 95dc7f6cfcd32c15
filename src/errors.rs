use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use sea_orm::error::{ConnAcquireErr, DbErr};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::entities::reservation::ReservationStatus;
use crate::services::customers::CustomerConflict;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Insufficient stock: only 3.00 available",
    "details": { "available": "3.00" },
    "request_id": "req-abc123xyz",
    "timestamp": "2025-10-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category
    #[schema(example = "Unprocessable Entity")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured context (available quantity, conflicting customers, offending field)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
    /// Request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Insufficient stock: only {available} available")]
    InsufficientStock { available: Decimal },

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Validation error: {field}: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Customer conflict for phone {}", .0.supplied_phone)]
    CustomerConflict(Box<CustomerConflict>),

    #[error("Stock is busy, please retry")]
    ContentionTimeout,

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err
            .field_errors()
            .keys()
            .next()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "request".to_string());
        ServiceError::ValidationError {
            field,
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ServiceError::ValidationError {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a database error, recognising lock waits that ran out of time.
    ///
    /// Postgres reports `lock_timeout` as SQLSTATE 55P03, SQLite reports a
    /// busy writer as "database is locked", and a starved pool surfaces as an
    /// acquire timeout. All three are safe to retry from scratch.
    pub fn db_error(err: DbErr) -> Self {
        if is_contention(&err) {
            ServiceError::ContentionTimeout
        } else {
            ServiceError::DatabaseError(err)
        }
    }

    /// Whether the caller may retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ContentionTimeout)
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. } | Self::CustomerConflict(_) => StatusCode::CONFLICT,
            Self::ValidationError { .. } => StatusCode::BAD_REQUEST,
            Self::ContentionTimeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::MigrationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_)
            | Self::SerializationError(_)
            | Self::InternalError(_)
            | Self::MigrationError(_) => "Internal server error".to_string(),
            Self::ContentionTimeout => {
                "The stock record is busy, please retry the operation".to_string()
            }
            Self::CustomerConflict(_) => {
                "Phone number matches an existing customer; choose use_existing or create_new"
                    .to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured details rendered alongside the message.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::InsufficientStock { available } => Some(json!({ "available": available })),
            Self::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            Self::ValidationError { field, reason } => {
                Some(json!({ "field": field, "reason": reason }))
            }
            Self::CustomerConflict(conflict) => serde_json::to_value(conflict.as_ref()).ok(),
            Self::ContentionTimeout => Some(json!({ "retryable": true })),
            _ => None,
        }
    }
}

fn is_contention(err: &DbErr) -> bool {
    if matches!(err, DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)) {
        return true;
    }
    let text = err.to_string().to_ascii_lowercase();
    text.contains("55p03")
        || text.contains("lock timeout")
        || text.contains("could not obtain lock")
        || text.contains("database is locked")
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn insufficient_stock_reports_available_quantity() {
        let response = ServiceError::InsufficientStock {
            available: dec!(3.00),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.message, "Insufficient stock: only 3.00 available");
        assert_eq!(payload.details.unwrap()["available"], "3.00");
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::validation("quantity", "must be positive").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                from: ReservationStatus::Confirmed,
                to: ReservationStatus::Pending,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ContentionTimeout.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("sensitive".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("boom".into())).response_message(),
            "Database error"
        );
    }

    #[test]
    fn lock_failures_become_contention_timeouts() {
        let pg = DbErr::Custom(
            "error returned from database: canceling statement due to lock timeout (55P03)".into(),
        );
        assert!(ServiceError::db_error(pg).is_retryable());

        let sqlite = DbErr::Custom("database is locked".into());
        assert!(ServiceError::db_error(sqlite).is_retryable());

        let acquire = DbErr::ConnectionAcquire(ConnAcquireErr::Timeout);
        assert!(ServiceError::db_error(acquire).is_retryable());

        let other = DbErr::Custom("syntax error".into());
        assert!(!ServiceError::db_error(other).is_retryable());
    }
}
