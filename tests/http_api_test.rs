mod common;

use axum::http::{Method, StatusCode};
use branch_reservations::entities::product::ProductUnit;
use common::{admin, agent, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn reservation_round_trip_over_http() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(20)).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "product_id": seeded.product_id,
                "branch_id": seeded.branch_id,
                "quantity": "2",
                "delivery_type": "pickup",
                "customer": { "name": "Mona Adel", "phone": "0100" }
            })),
            Some(&agent()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["quantity"], "2.00");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/reservations/{id}/status"),
            Some(json!({ "status": "confirmed" })),
            Some(&admin()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["admin_last_modified_by"], "admin");

    let response = app
        .request(Method::GET, &format!("/api/v1/reservations/{id}"), None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/branches/{}/stock", seeded.branch_id),
            None,
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"][0]["quantity"], "18.00");
}

#[tokio::test]
async fn insufficient_stock_is_unprocessable_with_available_quantity() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(3)).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "product_id": seeded.product_id,
                "branch_id": seeded.branch_id,
                "quantity": "5",
                "delivery_type": "delivery"
            })),
            Some(&agent()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["details"]["available"], "3.00");
}

#[tokio::test]
async fn customer_conflict_lists_candidates() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(3)).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Mona Adel", "phone": "0100" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "product_id": seeded.product_id,
                "branch_id": seeded.branch_id,
                "quantity": "1",
                "delivery_type": "pickup",
                "customer": { "name": "Sara", "phone": "0100" }
            })),
            Some(&agent()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["details"]["supplied_phone"], "0100");
    assert_eq!(body["details"]["candidates"][0]["name"], "Mona Adel");

    let response = app
        .request(
            Method::POST,
            "/api/v1/reservations/resolve-conflict",
            Some(json!({
                "product_id": seeded.product_id,
                "branch_id": seeded.branch_id,
                "quantity": "1",
                "delivery_type": "pickup",
                "resolution": { "choice": "create_new", "name": "Sara", "phone": "0100" }
            })),
            Some(&agent()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["customer_name"], "Sara");
}

#[tokio::test]
async fn invalid_transition_is_a_conflict() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(3)).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/reservations",
            Some(json!({
                "product_id": seeded.product_id,
                "branch_id": seeded.branch_id,
                "quantity": "1",
                "delivery_type": "pickup"
            })),
            Some(&agent()),
        )
        .await;
    let id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/reservations/{id}/status"),
            Some(json!({ "status": "pending" })),
            Some(&agent()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = response_json(response).await;
    assert_eq!(body["details"]["from"], "pending");
    assert_eq!(body["details"]["to"], "pending");
}

#[tokio::test]
async fn bad_input_is_rejected_before_touching_stock() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Piece, dec!(3)).await;
    let payload = json!({
        "product_id": seeded.product_id,
        "branch_id": seeded.branch_id,
        "quantity": "two",
        "delivery_type": "pickup"
    });

    let response = app
        .request(Method::POST, "/api/v1/reservations", Some(payload.clone()), Some(&agent()))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No acting user
    let response = app
        .request(Method::POST, "/api/v1/reservations", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["details"]["field"], "x-actor");

    let response = app
        .request(
            Method::PUT,
            &format!(
                "/api/v1/branches/{}/stock/{}",
                seeded.branch_id, seeded.product_id
            ),
            Some(json!({ "quantity": "-4" })),
            Some(&admin()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Larger than the stock column can store
    let response = app
        .request(
            Method::PUT,
            &format!(
                "/api/v1/branches/{}/stock/{}",
                seeded.branch_id, seeded.product_id
            ),
            Some(json!({ "quantity": "99999999999" })),
            Some(&admin()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["details"]["field"], "quantity");

    assert_eq!(app.on_hand(seeded).await, dec!(3));
}

#[tokio::test]
async fn manual_count_is_logged_as_transfer_in() {
    let app = TestApp::new().await;
    let seeded = app.seed(ProductUnit::Kg, dec!(1)).await;

    let response = app
        .request(
            Method::PUT,
            &format!(
                "/api/v1/branches/{}/stock/{}",
                seeded.branch_id, seeded.product_id
            ),
            Some(json!({ "quantity": "12.5" })),
            Some(&admin()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["quantity"], "12.50");

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/inventory-transactions?branch_id={}&transaction_type=transfer_in",
                seeded.branch_id
            ),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["transaction_type"] == "transfer_in"));
}

#[tokio::test]
async fn order_number_endpoints() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/order-numbers", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["order_number"], 1);

    let response = app
        .request(
            Method::POST,
            "/api/v1/order-numbers/1/announce",
            Some(json!({ "action": "printed" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/order-numbers/9/announce",
            Some(json!({ "action": "printed" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_reservation_is_not_found() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/reservations/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = response_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("not found"));
}
