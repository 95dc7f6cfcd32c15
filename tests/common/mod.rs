#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use branch_reservations::{
    build_router,
    config::AppConfig,
    db,
    entities::product::ProductUnit,
    events::{self, ControlAction, Event, EventSender},
    middleware_helpers::{Actor, ACTOR_HEADER, ACTOR_ROLE_HEADER},
    notifications::{Broadcaster, InMemoryBroadcaster, Topic},
    services::catalog::{NewBranch, NewProduct},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Branch, product and opening stock created for a test.
#[derive(Debug, Clone, Copy)]
pub struct Seeded {
    pub branch_id: Uuid,
    pub product_id: Uuid,
}

/// Application state backed by a throwaway SQLite file, with the fan-out
/// worker running against an in-memory hub.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub hub: Arc<InMemoryBroadcaster>,
    _event_task: tokio::task::JoinHandle<()>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// A pool of `connections` SQLite connections in WAL mode, so separate
    /// transactions really race for the database write lock.
    pub async fn with_pool_size(connections: u32) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("branch_reservations.db").display()
        );

        let mut cfg = AppConfig::new(url, "127.0.0.1".to_string(), 18_080, "test".to_string());
        cfg.auto_migrate = true;
        // SQLite serializes writers; one connection keeps most tests deterministic
        cfg.db_max_connections = connections;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        if connections > 1 {
            pool.execute_unprepared("PRAGMA journal_mode = WAL")
                .await
                .expect("enable WAL");
        }
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let hub = Arc::new(InMemoryBroadcaster::new(64));
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let broadcaster: Arc<dyn Broadcaster> = hub.clone();
        let event_task = tokio::spawn(events::process_events(event_rx, broadcaster));

        let state = AppState::new(Arc::new(pool), cfg, event_sender, hub.clone());
        let router = build_router(state.clone());

        Self {
            router,
            state,
            hub,
            _event_task: event_task,
            _dir: dir,
        }
    }

    /// Creates a branch and a product in a fresh category, then counts
    /// `opening` units onto the branch shelf.
    pub async fn seed(&self, unit: ProductUnit, opening: Decimal) -> Seeded {
        let branch_id = self.seed_branch("Nasr City").await;
        let product_id = self.seed_product("Basbousa", unit, true).await;
        self.set_stock(branch_id, product_id, opening).await;
        Seeded {
            branch_id,
            product_id,
        }
    }

    /// Waits until the fan-out worker has published every event queued so
    /// far. Subscribe to a topic after this to see only later messages.
    pub async fn drain_events(&self) {
        const MARKER: i64 = -1;
        let mut control = self.hub.subscribe(Topic::ControlUpdates);
        assert!(self.state.event_sender.publish(Event::OrderAnnounced {
            action: ControlAction::Printed,
            order_number: MARKER,
            branch_name: None,
        }));

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let text = control.recv().await.expect("control topic open");
                let message: Value = serde_json::from_str(&text).expect("control payload is json");
                if message["order_number"] == MARKER {
                    break;
                }
            }
        })
        .await
        .expect("event worker drained within 2s");
    }

    pub async fn seed_branch(&self, name: &str) -> Uuid {
        self.state
            .services
            .catalog
            .create_branch(NewBranch {
                name: name.to_string(),
                address: None,
                phone: None,
            })
            .await
            .expect("seed branch")
            .id
    }

    pub async fn seed_product(&self, name: &str, unit: ProductUnit, available: bool) -> Uuid {
        let catalog = &self.state.services.catalog;
        let category = catalog
            .create_category("Oriental")
            .await
            .expect("seed category");
        catalog
            .create_product(NewProduct {
                category_id: category.id,
                name: name.to_string(),
                price: Decimal::new(4500, 2),
                unit,
                is_available: available,
            })
            .await
            .expect("seed product")
            .id
    }

    pub async fn set_stock(&self, branch_id: Uuid, product_id: Uuid, qty: Decimal) {
        self.state
            .services
            .inventory
            .set_stock(branch_id, product_id, qty, &admin())
            .await
            .expect("seed stock");
    }

    pub async fn on_hand(&self, seeded: Seeded) -> Decimal {
        let ledger = branch_reservations::services::StockLedger::new(
            self.state.config.stock_lock_timeout(),
        );
        ledger
            .on_hand(&*self.state.db, seeded.branch_id, seeded.product_id)
            .await
            .expect("read stock")
    }

    /// Sends a request as `actor`, if given.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(actor) = actor {
            builder = builder.header(ACTOR_HEADER, actor.username.as_str());
            if actor.is_admin {
                builder = builder.header(ACTOR_ROLE_HEADER, "admin");
            }
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn agent() -> Actor {
    Actor::branch("agent-1")
}

pub fn admin() -> Actor {
    Actor::admin("admin")
}

pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
