//! Branch Reservations
//!
//! Per-branch stock ledger, phone-order reservations with customer
//! disambiguation, and live dashboard fan-out for a multi-branch retailer.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod notifications;
pub mod openapi;
pub mod quantity;
pub mod services;
pub mod tracing;

use axum::{routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;

use crate::events::EventSender;
use crate::notifications::InMemoryBroadcaster;
use crate::services::StockLedger;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: handlers::AppServices,
    /// Local topic channels that WebSocket subscribers read from
    pub hub: Arc<InMemoryBroadcaster>,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: EventSender,
        hub: Arc<InMemoryBroadcaster>,
    ) -> Self {
        let ledger = StockLedger::new(config.stock_lock_timeout());
        let services = handlers::AppServices::new(db.clone(), ledger, event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            services,
            hub,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Versioned REST surface, mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::health::api_status))
        .nest(
            "/reservations",
            handlers::reservations::reservation_routes(),
        )
        .nest(
            "/branches",
            handlers::catalog::branch_routes().merge(handlers::stock::branch_stock_routes()),
        )
        .nest("/products", handlers::catalog::product_routes())
        .nest(
            "/inventory-transactions",
            handlers::stock::transaction_routes(),
        )
        .nest("/customers", handlers::customers::customer_routes())
        .nest(
            "/order-numbers",
            handlers::order_numbers::order_number_routes(),
        )
}

/// Full application router without the outer HTTP layers (CORS, tracing,
/// compression) that the binary adds.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api/v1", api_v1_routes())
        .nest("/ws", handlers::live::live_routes())
        .merge(openapi::openapi_routes())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}
