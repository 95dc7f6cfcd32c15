mod common;

use std::time::Duration;

use branch_reservations::{
    entities::{
        product::ProductUnit,
        reservation::{DeliveryType, ReservationStatus},
    },
    events::ControlAction,
    notifications::Topic,
    services::{customers::CustomerInput, reservations::NewReservation},
};
use common::{admin, agent, TestApp};
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::broadcast;

async fn next(rx: &mut broadcast::Receiver<String>) -> Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("topic message within 2s")
        .expect("topic open");
    serde_json::from_str(&text).expect("topic payload is json")
}

#[tokio::test]
async fn new_reservation_reaches_every_dashboard() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    app.drain_events().await;

    let mut callcenter = app.hub.subscribe(Topic::CallcenterUpdates);
    let mut branch = app.hub.subscribe(Topic::BranchUpdates);
    let mut list = app.hub.subscribe(Topic::ReservationsUpdates);

    let view = app
        .state
        .services
        .reservations
        .create_reservation(
            NewReservation {
                product_id: seeded.product_id,
                branch_id: seeded.branch_id,
                quantity: dec!(2),
                delivery_type: DeliveryType::Delivery,
            },
            CustomerInput {
                name: Some("Mona Adel".into()),
                phone: Some("0100".into()),
                address: None,
            },
            &agent(),
        )
        .await
        .unwrap();

    let stock = next(&mut callcenter).await;
    assert_eq!(stock["action"], "stock_update");
    assert_eq!(stock["new_qty"], "18.00");
    assert_eq!(stock["branch_name"], "Nasr City");
    assert_eq!(stock["category_name"], "Oriental");

    let feed = next(&mut branch).await;
    assert_eq!(feed["reservation_id"], view.id.to_string());
    assert_eq!(feed["customer_phone"], "0100");
    assert_eq!(feed["reserved_by"], "agent-1");

    let row = next(&mut list).await;
    assert_eq!(row["action"], "new");
    assert_eq!(row["status"], "pending");
    assert_eq!(row["delivery_type"], "delivery");
    assert_eq!(row["quantity"], "2.00");
}

#[tokio::test]
async fn cancellation_updates_the_list_and_the_stock_grid() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let view = app
        .state
        .services
        .reservations
        .create_reservation(
            NewReservation {
                product_id: seeded.product_id,
                branch_id: seeded.branch_id,
                quantity: dec!(2),
                delivery_type: DeliveryType::Pickup,
            },
            CustomerInput::default(),
            &agent(),
        )
        .await
        .unwrap();
    app.drain_events().await;

    let mut callcenter = app.hub.subscribe(Topic::CallcenterUpdates);
    let mut list = app.hub.subscribe(Topic::ReservationsUpdates);

    app.state
        .services
        .reservations
        .transition_status(view.id, ReservationStatus::Cancelled, &admin())
        .await
        .unwrap();

    let row = next(&mut list).await;
    assert_eq!(row["action"], "status_change");
    assert_eq!(row["status"], "cancelled");
    assert!(row["decision_at"].is_string());

    let stock = next(&mut callcenter).await;
    assert_eq!(stock["new_qty"], "20.00");
}

#[tokio::test]
async fn manual_count_is_pushed_to_the_callcenter() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Kg, dec!(1)).await;
    app.drain_events().await;
    let mut callcenter = app.hub.subscribe(Topic::CallcenterUpdates);

    app.set_stock(seeded.branch_id, seeded.product_id, dec!(7.5)).await;

    let stock = next(&mut callcenter).await;
    assert_eq!(stock["new_qty"], "7.50");
    assert_eq!(stock["unit"], "kg");
}

#[tokio::test]
async fn order_numbers_are_sequential_and_announced() {
    let app = TestApp::new().await;
    let sequence = &app.state.services.order_sequence;
    let mut control = app.hub.subscribe(Topic::ControlUpdates);

    assert_eq!(sequence.current().await.unwrap(), 0);
    assert_eq!(sequence.next_order_number().await.unwrap(), 1);
    assert_eq!(sequence.next_order_number().await.unwrap(), 2);

    sequence
        .announce(2, ControlAction::New, Some("Nasr City".into()))
        .await
        .unwrap();
    let message = next(&mut control).await;
    assert_eq!(message["action"], "new");
    assert_eq!(message["order_number"], 2);
    assert_eq!(message["message"], "New daily request from Nasr City");

    assert!(sequence.announce(3, ControlAction::Printed, None).await.is_err());
}

#[tokio::test]
async fn concurrent_order_numbers_are_unique() {
    let app = TestApp::new().await;
    let mut handles = Vec::new();
    for _ in 0..10 {
        let sequence = app.state.services.order_sequence.clone();
        handles.push(tokio::spawn(async move { sequence.next_order_number().await }));
    }

    let mut numbers = Vec::new();
    for handle in handles {
        numbers.push(handle.await.unwrap().unwrap());
    }
    numbers.sort_unstable();
    assert_eq!(numbers, (1..=10).collect::<Vec<i64>>());
}
