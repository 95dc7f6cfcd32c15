mod common;

use assert_matches::assert_matches;
use branch_reservations::{
    entities::{product::ProductUnit, reservation::DeliveryType},
    errors::ServiceError,
    services::{
        customers::{CustomerChoice, CustomerInput, NewCustomer, PLACEHOLDER_NAME},
        reservations::NewReservation,
    },
};
use common::{agent, Seeded, TestApp};
use rust_decimal_macros::dec;

fn one_piece(seeded: Seeded) -> NewReservation {
    NewReservation {
        product_id: seeded.product_id,
        branch_id: seeded.branch_id,
        quantity: dec!(1),
        delivery_type: DeliveryType::Pickup,
    }
}

fn input(name: Option<&str>, phone: Option<&str>) -> CustomerInput {
    CustomerInput {
        name: name.map(str::to_string),
        phone: phone.map(str::to_string),
        address: None,
    }
}

async fn register(app: &TestApp, name: &str, phone: &str) -> uuid::Uuid {
    app.state
        .services
        .customers
        .create(NewCustomer {
            name: name.to_string(),
            phone: Some(phone.to_string()),
            address: None,
        })
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn same_phone_different_name_needs_a_decision() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let existing = register(&app, "Mona Adel", "01001234567").await;

    let err = app
        .state
        .services
        .reservations
        .create_reservation(one_piece(seeded), input(Some("Sara"), Some("01001234567")), &agent())
        .await
        .unwrap_err();

    let conflict = assert_matches!(err, ServiceError::CustomerConflict(c) => c);
    assert_eq!(conflict.supplied_name.as_deref(), Some("Sara"));
    assert_eq!(conflict.supplied_phone, "01001234567");
    assert_eq!(conflict.candidates.len(), 1);
    assert_eq!(conflict.candidates[0].id, existing);

    // Nothing was written
    assert_eq!(app.on_hand(seeded).await, dec!(10));
    let on_file = app
        .state
        .services
        .customers
        .lookup_by_phone("01001234567")
        .await
        .unwrap();
    assert_eq!(on_file.len(), 1);
}

#[tokio::test]
async fn repeat_caller_reuses_the_customer_created_on_first_call() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let reservations = &app.state.services.reservations;

    let first = reservations
        .create_reservation(one_piece(seeded), input(Some("Hoda"), Some("0155")), &agent())
        .await
        .unwrap();
    let second = reservations
        .create_reservation(one_piece(seeded), input(Some("Hoda"), Some("0155")), &agent())
        .await
        .unwrap();
    assert!(first.customer_id.is_some());
    assert_eq!(first.customer_id, second.customer_id);

    let err = reservations
        .create_reservation(one_piece(seeded), input(Some("Sara"), Some("0155")), &agent())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CustomerConflict(_));
}

#[tokio::test]
async fn matching_name_reuses_the_customer() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let existing = register(&app, "Mona Adel", "0100").await;

    let view = app
        .state
        .services
        .reservations
        .create_reservation(one_piece(seeded), input(Some("  mona   ADEL "), Some("0100")), &agent())
        .await
        .unwrap();
    assert_eq!(view.customer_id, Some(existing));
    assert_eq!(view.customer_name.as_deref(), Some("Mona Adel"));
}

#[tokio::test]
async fn phone_alone_reuses_a_single_match() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let existing = register(&app, "Mona Adel", "0100").await;

    let view = app
        .state
        .services
        .reservations
        .create_reservation(one_piece(seeded), input(None, Some("0100")), &agent())
        .await
        .unwrap();
    assert_eq!(view.customer_id, Some(existing));
}

#[tokio::test]
async fn several_customers_on_one_phone_always_conflict() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    register(&app, "Mona Adel", "0100").await;
    register(&app, "Adel Hassan", "0100").await;

    let err = app
        .state
        .services
        .reservations
        .create_reservation(one_piece(seeded), input(Some("Mona Adel"), Some("0100")), &agent())
        .await
        .unwrap_err();
    let conflict = assert_matches!(err, ServiceError::CustomerConflict(c) => c);
    assert_eq!(conflict.candidates.len(), 2);
}

#[tokio::test]
async fn unknown_phone_creates_a_customer() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let reservations = &app.state.services.reservations;

    let named = reservations
        .create_reservation(one_piece(seeded), input(Some("Hoda"), Some("0155")), &agent())
        .await
        .unwrap();
    assert_eq!(named.customer_name.as_deref(), Some("Hoda"));
    assert_eq!(named.customer_phone.as_deref(), Some("0155"));

    let anonymous = reservations
        .create_reservation(one_piece(seeded), input(None, Some("0166")), &agent())
        .await
        .unwrap();
    assert_eq!(anonymous.customer_name.as_deref(), Some(PLACEHOLDER_NAME));
}

#[tokio::test]
async fn walk_in_without_details_has_no_customer() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;

    let view = app
        .state
        .services
        .reservations
        .create_reservation(one_piece(seeded), input(Some("  "), None), &agent())
        .await
        .unwrap();
    assert!(view.customer_id.is_none());
    assert!(view.customer_name.is_none());
    assert_eq!(app.on_hand(seeded).await, dec!(9));
}

#[tokio::test]
async fn resolving_with_an_existing_customer() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let existing = register(&app, "Mona Adel", "0100").await;

    let view = app
        .state
        .services
        .reservations
        .resolve_conflict(
            one_piece(seeded),
            CustomerChoice::UseExisting {
                customer_id: existing,
            },
            &agent(),
        )
        .await
        .unwrap();
    assert_eq!(view.customer_id, Some(existing));
    assert_eq!(app.on_hand(seeded).await, dec!(9));
}

#[tokio::test]
async fn resolving_with_a_new_customer_shares_the_phone() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;
    let existing = register(&app, "Mona Adel", "0100").await;

    let view = app
        .state
        .services
        .reservations
        .resolve_conflict(
            one_piece(seeded),
            CustomerChoice::CreateNew {
                name: "Sara".into(),
                phone: Some("0100".into()),
                address: Some("12 Tahrir St".into()),
            },
            &agent(),
        )
        .await
        .unwrap();
    assert_ne!(view.customer_id, Some(existing));
    assert_eq!(view.customer_name.as_deref(), Some("Sara"));

    let on_file = app
        .state
        .services
        .customers
        .lookup_by_phone("0100")
        .await
        .unwrap();
    assert_eq!(on_file.len(), 2);
}

#[tokio::test]
async fn resolving_with_an_unknown_customer_fails() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(10)).await;

    let err = app
        .state
        .services
        .reservations
        .resolve_conflict(
            one_piece(seeded),
            CustomerChoice::UseExisting {
                customer_id: uuid::Uuid::new_v4(),
            },
            &agent(),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
    assert_eq!(app.on_hand(seeded).await, dec!(10));
}

#[tokio::test]
async fn customer_search_matches_name_or_phone() {
    let app = TestApp::new().await;
    register(&app, "Mona Adel", "0100").await;
    register(&app, "Karim Nabil", "0122").await;

    let customers = &app.state.services.customers;
    let by_name = customers.search(Some("Karim"), 50).await.unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].phone.as_deref(), Some("0122"));

    let by_phone = customers.search(Some("010"), 50).await.unwrap();
    assert_eq!(by_phone.len(), 1);
    assert_eq!(by_phone[0].name, "Mona Adel");

    assert_eq!(customers.search(None, 50).await.unwrap().len(), 2);
}
