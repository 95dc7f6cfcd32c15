pub mod branch;
pub mod category;
pub mod customer;
pub mod inventory_transaction;
pub mod order_counter;
pub mod product;
pub mod reservation;
pub mod stock_line;
