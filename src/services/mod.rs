pub mod catalog;
pub mod customers;
pub mod inventory;
pub mod order_sequence;
pub mod reservations;
pub mod stock_ledger;

pub use catalog::CatalogService;
pub use customers::CustomerService;
pub use inventory::InventoryService;
pub use order_sequence::OrderSequence;
pub use reservations::ReservationService;
pub use stock_ledger::StockLedger;
