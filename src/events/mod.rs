//! Post-commit domain events.
//!
//! Services emit an [`Event`] only after their transaction has committed.
//! Emission never blocks and never fails the caller: a full or closed queue
//! drops the event with a warning. A single worker drains the queue in order
//! and hands each event to the notification fan-out.

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::product::ProductUnit;
use crate::entities::reservation::{DeliveryType, ReservationStatus};
use crate::notifications::{self, Broadcaster};

/// Everything the dashboards render about one reservation, captured inside
/// the transaction that changed it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReservationSnapshot {
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

/// A stock line after a mutation, with the labels the call-center grid shows.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockSnapshot {
    pub product_id: Uuid,
    pub product_name: String,
    pub category_name: String,
    pub branch_id: Uuid,
    pub branch_name: String,
    pub unit: ProductUnit,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ControlAction {
    /// A branch confirmed a new daily request
    New,
    /// The control room printed a request
    Printed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    ReservationCreated {
        reservation: ReservationSnapshot,
        stock: StockSnapshot,
    },
    ReservationStatusChanged {
        reservation: ReservationSnapshot,
        /// Present when the transition moved stock
        stock: Option<StockSnapshot>,
    },
    StockSet(StockSnapshot),
    OrderAnnounced {
        action: ControlAction,
        order_number: i64,
        branch_name: Option<String>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ReservationCreated { .. } => "reservation_created",
            Event::ReservationStatusChanged { .. } => "reservation_status_changed",
            Event::StockSet(_) => "stock_set",
            Event::OrderAnnounced { .. } => "order_announced",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Queues an event for fan-out without waiting. Returns whether the event
    /// was accepted; a rejected event is logged and counted, never surfaced.
    pub fn publish(&self, event: Event) -> bool {
        let kind = event.kind();
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = kind, "Event queue full; dropping event");
                counter!("branch_reservations.events.dropped", 1, "reason" => "full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(event = kind, "Event queue closed; dropping event");
                counter!("branch_reservations.events.dropped", 1, "reason" => "closed");
                false
            }
        }
    }
}

/// Drains the event queue, publishing every topic message an event maps to.
/// Publish failures are logged and swallowed.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, broadcaster: Arc<dyn Broadcaster>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        debug!(event = event.kind(), "Fanning out event");

        for message in notifications::fan_out_plan(&event) {
            let topic = message.topic;
            match broadcaster.publish(topic, &message.payload).await {
                Ok(receivers) => {
                    debug!(%topic, receivers, "Published topic message");
                    counter!(
                        "branch_reservations.fanout.published",
                        1,
                        "topic" => topic.to_string()
                    );
                }
                Err(e) => {
                    warn!(%topic, error = %e, "Failed to publish topic message");
                    counter!(
                        "branch_reservations.fanout.failures",
                        1,
                        "topic" => topic.to_string()
                    );
                }
            }
        }
    }

    info!("Event processing loop stopped");
}
