pub mod catalog;
pub mod customers;
pub mod health;
pub mod live;
pub mod order_numbers;
pub mod reservations;
pub mod stock;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    CatalogService, CustomerService, InventoryService, OrderSequence, ReservationService,
    StockLedger,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub reservations: Arc<ReservationService>,
    pub inventory: Arc<InventoryService>,
    pub customers: Arc<CustomerService>,
    pub catalog: Arc<CatalogService>,
    pub order_sequence: Arc<OrderSequence>,
}

impl AppServices {
    /// Wires every service against one pool, one ledger and one event queue.
    pub fn new(db_pool: Arc<DbPool>, ledger: StockLedger, event_sender: EventSender) -> Self {
        Self {
            reservations: Arc::new(ReservationService::new(
                db_pool.clone(),
                ledger.clone(),
                event_sender.clone(),
            )),
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                ledger,
                event_sender.clone(),
            )),
            customers: Arc::new(CustomerService::new(db_pool.clone())),
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            order_sequence: Arc::new(OrderSequence::new(db_pool, event_sender)),
        }
    }
}
