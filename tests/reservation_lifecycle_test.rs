mod common;

use assert_matches::assert_matches;
use branch_reservations::{
    entities::{
        product::ProductUnit,
        reservation::{DeliveryType, ReservationStatus, StockEffect},
    },
    errors::ServiceError,
    middleware_helpers::Actor,
    services::{
        customers::CustomerInput,
        reservations::{NewReservation, ReservationFilter, ReservationView},
    },
};
use common::{admin, agent, Seeded, TestApp};
use rstest::rstest;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn order(seeded: Seeded, quantity: Decimal) -> NewReservation {
    NewReservation {
        product_id: seeded.product_id,
        branch_id: seeded.branch_id,
        quantity,
        delivery_type: DeliveryType::Delivery,
    }
}

fn customer(name: &str, phone: &str) -> CustomerInput {
    CustomerInput {
        name: Some(name.to_string()),
        phone: Some(phone.to_string()),
        address: None,
    }
}

async fn reserve(app: &TestApp, seeded: Seeded, quantity: Decimal) -> ReservationView {
    app.state
        .services
        .reservations
        .create_reservation(order(seeded, quantity), customer("Mona Adel", "01001234567"), &agent())
        .await
        .unwrap()
}

async fn move_to(
    app: &TestApp,
    view: &ReservationView,
    target: ReservationStatus,
    actor: &Actor,
) -> Result<ReservationView, ServiceError> {
    app.state
        .services
        .reservations
        .transition_status(view.id, target, actor)
        .await
}

#[rstest]
#[case(ReservationStatus::Pending, ReservationStatus::Confirmed, Some(StockEffect::None))]
#[case(ReservationStatus::Pending, ReservationStatus::Cancelled, Some(StockEffect::Release))]
#[case(ReservationStatus::Confirmed, ReservationStatus::Cancelled, Some(StockEffect::Release))]
#[case(ReservationStatus::Cancelled, ReservationStatus::Confirmed, Some(StockEffect::Reserve))]
#[case(ReservationStatus::Confirmed, ReservationStatus::Pending, None)]
#[case(ReservationStatus::Cancelled, ReservationStatus::Pending, None)]
#[case(ReservationStatus::Pending, ReservationStatus::Pending, None)]
#[case(ReservationStatus::Confirmed, ReservationStatus::Confirmed, None)]
#[case(ReservationStatus::Cancelled, ReservationStatus::Cancelled, None)]
fn transition_table(
    #[case] from: ReservationStatus,
    #[case] to: ReservationStatus,
    #[case] effect: Option<StockEffect>,
) {
    assert_eq!(from.transition_to(to), effect);
}

#[tokio::test]
async fn creation_debits_stock_and_records_the_agent() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;

    let view = reserve(&app, seeded, dec!(2)).await;

    assert_eq!(view.status, ReservationStatus::Pending);
    assert_eq!(view.quantity.to_string(), "2.00");
    assert_eq!(view.reserved_by, "agent-1");
    assert_eq!(view.customer_name.as_deref(), Some("Mona Adel"));
    assert_eq!(view.product_name, "Basbousa");
    assert_eq!(view.branch_name, "Nasr City");
    assert!(view.decision_at.is_none());
    assert_eq!(app.on_hand(seeded).await, dec!(18.00));
}

#[tokio::test]
async fn cancel_and_reconfirm_move_stock_back_and_forth() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;

    let view = reserve(&app, seeded, dec!(2)).await;
    assert_eq!(app.on_hand(seeded).await, dec!(18));

    let view = move_to(&app, &view, ReservationStatus::Cancelled, &agent()).await.unwrap();
    assert_eq!(app.on_hand(seeded).await, dec!(20));

    let view = move_to(&app, &view, ReservationStatus::Confirmed, &agent()).await.unwrap();
    assert_eq!(app.on_hand(seeded).await, dec!(18));

    move_to(&app, &view, ReservationStatus::Cancelled, &agent()).await.unwrap();
    assert_eq!(app.on_hand(seeded).await, dec!(20));
}

#[tokio::test]
async fn confirming_a_pending_reservation_leaves_stock_alone() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let view = reserve(&app, seeded, dec!(2)).await;

    let confirmed = move_to(&app, &view, ReservationStatus::Confirmed, &agent()).await.unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(app.on_hand(seeded).await, dec!(18));
}

#[tokio::test]
async fn reconfirm_without_stock_keeps_reservation_cancelled() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(5)).await;

    let view = reserve(&app, seeded, dec!(4)).await;
    move_to(&app, &view, ReservationStatus::Cancelled, &agent()).await.unwrap();

    // Someone else takes most of the returned stock
    reserve(&app, seeded, dec!(3)).await;

    let err = move_to(&app, &view, ReservationStatus::Confirmed, &admin()).await.unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available } if available == dec!(2.00));

    let reloaded = app.state.services.reservations.get(view.id).await.unwrap();
    assert_eq!(reloaded.status, ReservationStatus::Cancelled);
    assert!(reloaded.admin_last_modified_by.is_none());
    assert_eq!(app.on_hand(seeded).await, dec!(2));
}

#[tokio::test]
async fn forbidden_transitions_change_nothing() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let view = reserve(&app, seeded, dec!(2)).await;
    let view = move_to(&app, &view, ReservationStatus::Confirmed, &agent()).await.unwrap();

    let err = move_to(&app, &view, ReservationStatus::Pending, &agent()).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition {
            from: ReservationStatus::Confirmed,
            to: ReservationStatus::Pending
        }
    );

    let err = move_to(&app, &view, ReservationStatus::Confirmed, &agent()).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    let reloaded = app.state.services.reservations.get(view.id).await.unwrap();
    assert_eq!(reloaded, view);
    assert_eq!(app.on_hand(seeded).await, dec!(18));
}

#[tokio::test]
async fn decision_time_is_set_once() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let view = reserve(&app, seeded, dec!(1)).await;

    let first = move_to(&app, &view, ReservationStatus::Confirmed, &agent()).await.unwrap();
    let decided_at = first.decision_at.expect("decision time recorded");

    let second = move_to(&app, &first, ReservationStatus::Cancelled, &agent()).await.unwrap();
    assert_eq!(second.decision_at, Some(decided_at));

    let third = move_to(&app, &second, ReservationStatus::Confirmed, &admin()).await.unwrap();
    assert_eq!(third.decision_at, Some(decided_at));
}

#[tokio::test]
async fn admin_and_branch_changes_use_separate_audit_fields() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let view = reserve(&app, seeded, dec!(1)).await;

    let by_branch = move_to(&app, &view, ReservationStatus::Confirmed, &Actor::branch("branch-7"))
        .await
        .unwrap();
    assert_eq!(by_branch.branch_last_modified_by.as_deref(), Some("branch-7"));
    assert!(by_branch.branch_last_modified_at.is_some());
    assert!(by_branch.admin_last_modified_by.is_none());
    assert!(by_branch.admin_last_modified_at.is_none());

    let by_admin = move_to(&app, &by_branch, ReservationStatus::Cancelled, &Actor::admin("layla"))
        .await
        .unwrap();
    assert_eq!(by_admin.admin_last_modified_by.as_deref(), Some("layla"));
    assert!(by_admin.admin_last_modified_at.is_some());
    assert_eq!(by_admin.branch_last_modified_by.as_deref(), Some("branch-7"));
}

#[tokio::test]
async fn piece_quantities_round_half_up() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;

    let view = reserve(&app, seeded, dec!(2.5)).await;
    assert_eq!(view.quantity, dec!(3));
    assert_eq!(app.on_hand(seeded).await, dec!(7));

    let err = app
        .state
        .services
        .reservations
        .create_reservation(order(seeded, dec!(0.4)), CustomerInput::default(), &agent())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { field, .. } if field == "quantity");
    assert_eq!(app.on_hand(seeded).await, dec!(7));
}

#[tokio::test]
async fn kilogram_quantities_keep_two_decimals() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Kg, dec!(3)).await;

    let view = reserve(&app, seeded, dec!(1.255)).await;
    assert_eq!(view.quantity.to_string(), "1.26");
    assert_eq!(app.on_hand(seeded).await.to_string(), "1.74");
}

#[tokio::test]
async fn insufficient_stock_creates_nothing() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Tray, dec!(1)).await;

    let err = app
        .state
        .services
        .reservations
        .create_reservation(order(seeded, dec!(2)), customer("Hoda", "0111"), &agent())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock { available } if available == dec!(1));

    let listed = app
        .state
        .services
        .reservations
        .list(ReservationFilter::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
    assert!(app
        .state
        .services
        .customers
        .lookup_by_phone("0111")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn unavailable_products_cannot_be_reserved() {
    let app = TestApp::new().await;
    let branch_id = app.seed_branch("Maadi").await;
    let product_id = app.seed_product("Seasonal tray", ProductUnit::Tray, false).await;
    app.set_stock(branch_id, product_id, dec!(5)).await;

    let err = app
        .state
        .services
        .reservations
        .create_reservation(
            NewReservation {
                product_id,
                branch_id,
                quantity: dec!(1),
                delivery_type: DeliveryType::Pickup,
            },
            CustomerInput::default(),
            &agent(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError { field, .. } if field == "product_id");
}

#[tokio::test]
async fn list_filters_by_status_and_search_newest_first() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;
    let reservations = &app.state.services.reservations;

    let first = reserve(&app, seeded, dec!(1)).await;
    let second = reservations
        .create_reservation(order(seeded, dec!(1)), customer("Karim", "0122"), &agent())
        .await
        .unwrap();
    move_to(&app, &first, ReservationStatus::Cancelled, &agent()).await.unwrap();

    let all = reservations.list(ReservationFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, second.id);

    let cancelled = reservations
        .list(ReservationFilter {
            status: Some(ReservationStatus::Cancelled),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].id, first.id);

    let karim = reservations
        .list(ReservationFilter {
            search: Some("0122".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(karim.len(), 1);
    assert_eq!(karim[0].customer_name.as_deref(), Some("Karim"));
}
