//! Dashboard fan-out.
//!
//! One domain event becomes one or more topic messages, each shaped for the
//! dashboard that listens on that topic. Quantities travel as decimal
//! strings. Delivery is best effort: subscribers that miss a message re-fetch
//! through the REST endpoints.

mod broadcast;
mod redis_backend;

pub use self::broadcast::{Broadcaster, InMemoryBroadcaster};
pub use self::redis_backend::{relay_redis_to_local, RedisBroadcaster};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::entities::product::ProductUnit;
use crate::entities::reservation::{DeliveryType, ReservationStatus};
use crate::events::{ControlAction, Event, ReservationSnapshot, StockSnapshot};

/// Broadcast topics, one per independently rendered dashboard
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    /// Stock grid used by call-center agents
    CallcenterUpdates,
    /// New-reservation feed shown in every branch
    BranchUpdates,
    /// Reservation list page
    ReservationsUpdates,
    /// Production control room
    ControlUpdates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicMessage {
    pub topic: Topic,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallcenterAction {
    StockUpdate,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationsAction {
    New,
    StatusChange,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallcenterUpdate {
    pub action: CallcenterAction,
    pub product_id: Uuid,
    pub product_name: String,
    pub category_name: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub new_qty: Decimal,
    pub unit: ProductUnit,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BranchUpdate {
    pub message: String,
    pub reservation_id: Uuid,
    pub product_name: String,
    pub quantity: Decimal,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub reserved_by: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReservationsUpdate {
    pub action: ReservationsAction,
    pub message: String,
    pub reservation_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub product_name: String,
    pub quantity: Decimal,
    pub branch_name: String,
    pub delivery_type: DeliveryType,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub decision_at: Option<DateTime<Utc>>,
    pub branch_last_modified_at: Option<DateTime<Utc>>,
    pub reserved_by: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ControlUpdate {
    pub action: ControlAction,
    pub message: String,
    pub order_number: i64,
}

impl From<&StockSnapshot> for CallcenterUpdate {
    fn from(stock: &StockSnapshot) -> Self {
        Self {
            action: CallcenterAction::StockUpdate,
            product_id: stock.product_id,
            product_name: stock.product_name.clone(),
            category_name: stock.category_name.clone(),
            branch_id: stock.branch_id,
            branch_name: stock.branch_name.clone(),
            new_qty: stock.quantity,
            unit: stock.unit,
            message: format!(
                "{} at {} is now {}",
                stock.product_name, stock.branch_name, stock.quantity
            ),
        }
    }
}

impl From<&ReservationSnapshot> for BranchUpdate {
    fn from(r: &ReservationSnapshot) -> Self {
        Self {
            message: format!(
                "New reservation at {} ({} x {})",
                r.branch_name, r.product_name, r.quantity
            ),
            reservation_id: r.reservation_id,
            product_name: r.product_name.clone(),
            quantity: r.quantity,
            customer_name: r.customer_name.clone(),
            customer_phone: r.customer_phone.clone(),
            created_at: r.created_at,
            reserved_by: r.reserved_by.clone(),
        }
    }
}

impl ReservationsUpdate {
    fn new(action: ReservationsAction, r: &ReservationSnapshot) -> Self {
        let message = match action {
            ReservationsAction::New => format!("Reservation {} added", r.reservation_id),
            ReservationsAction::StatusChange => {
                format!("Reservation {} is now {}", r.reservation_id, r.status)
            }
        };
        Self {
            action,
            message,
            reservation_id: r.reservation_id,
            customer_name: r.customer_name.clone(),
            customer_phone: r.customer_phone.clone(),
            product_name: r.product_name.clone(),
            quantity: r.quantity,
            branch_name: r.branch_name.clone(),
            delivery_type: r.delivery_type,
            status: r.status,
            created_at: r.created_at,
            decision_at: r.decision_at,
            branch_last_modified_at: r.branch_last_modified_at,
            reserved_by: r.reserved_by.clone(),
        }
    }
}

impl ControlUpdate {
    fn new(action: ControlAction, order_number: i64, branch_name: Option<&str>) -> Self {
        let message = match (action, branch_name) {
            (ControlAction::New, Some(branch)) => format!("New daily request from {}", branch),
            (ControlAction::New, None) => format!("New daily request #{}", order_number),
            (ControlAction::Printed, _) => format!("Order {} marked as printed", order_number),
        };
        Self {
            action,
            message,
            order_number,
        }
    }
}

fn message<T: Serialize>(topic: Topic, payload: &T) -> Option<TopicMessage> {
    match serde_json::to_value(payload) {
        Ok(payload) => Some(TopicMessage { topic, payload }),
        Err(e) => {
            warn!(%topic, error = %e, "Failed to encode topic payload");
            None
        }
    }
}

/// Maps an event to the topic messages it fans out to
pub fn fan_out_plan(event: &Event) -> Vec<TopicMessage> {
    let messages = match event {
        Event::ReservationCreated { reservation, stock } => vec![
            message(Topic::CallcenterUpdates, &CallcenterUpdate::from(stock)),
            message(Topic::BranchUpdates, &BranchUpdate::from(reservation)),
            message(
                Topic::ReservationsUpdates,
                &ReservationsUpdate::new(ReservationsAction::New, reservation),
            ),
        ],
        Event::ReservationStatusChanged { reservation, stock } => {
            let mut out = vec![message(
                Topic::ReservationsUpdates,
                &ReservationsUpdate::new(ReservationsAction::StatusChange, reservation),
            )];
            if let Some(stock) = stock {
                out.push(message(
                    Topic::CallcenterUpdates,
                    &CallcenterUpdate::from(stock),
                ));
            }
            out
        }
        Event::StockSet(stock) => vec![message(
            Topic::CallcenterUpdates,
            &CallcenterUpdate::from(stock),
        )],
        Event::OrderAnnounced {
            action,
            order_number,
            branch_name,
        } => vec![message(
            Topic::ControlUpdates,
            &ControlUpdate::new(*action, *order_number, branch_name.as_deref()),
        )],
    };

    messages.into_iter().flatten().collect()
}
