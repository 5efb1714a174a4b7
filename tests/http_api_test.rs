//! HTTP-level tests driving the full router with `tower::ServiceExt`.

mod common;

use axum::{body, http::Method, http::StatusCode, response::Response};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use common::TestApp;

async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let app = TestApp::new();
    let response = app.request(Method::GET, "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn entering_checkout_with_an_empty_cart_redirects_away() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "user_id": app.user_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["kind"], "EMPTY_CART");
}

#[tokio::test]
async fn full_cod_checkout_over_http() {
    let app = TestApp::new();
    app.seed_cart(dec!(200000), 800);

    // Enter checkout.
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "user_id": app.user_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["kind"], "STARTED");
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    // Contact details.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/{}/contact", session_id),
            Some(json!({
                "full_name": "Nguyen Van A",
                "phone": "0900000001",
                "email": "buyer@example.com",
                "address_line": "12 Hang Gai"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Cascading destination selection.
    for (segment, code) in [
        ("region", "R01"),
        ("sub-region", "R01-D1"),
        ("locality", "R01-D1-W1"),
    ] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/checkout/{}/{}", session_id, segment),
                Some(json!({ "code": code })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "selecting {}", segment);
    }

    // The last selection completed the destination, so a fee is quoted.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/{}", session_id),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["shipping_fee"], "25000");

    // Advance, pick COD, place the order.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{}/advance", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/{}/payment-method", session_id),
            Some(json!({ "method": "COD", "gateway": null })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{}/place-order", session_id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["kind"], "COMPLETED");
    assert_eq!(body["data"]["outcome"]["success"], true);
    let order_number = body["data"]["outcome"]["order_number"]
        .as_str()
        .unwrap()
        .to_string();

    // COD settlement view.
    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/payment/cod/{}?user_id={}",
                order_number, app.user_id
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["outcome"]["success"], true);
    assert_eq!(body["data"]["breakdown"]["total_amount"], "245000");
}

#[tokio::test]
async fn invalid_contact_details_are_rejected_with_400() {
    let app = TestApp::new();
    app.seed_cart(dec!(200000), 500);

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "user_id": app.user_id })),
        )
        .await;
    let body = response_json(response).await;
    let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/{}/contact", session_id),
            Some(json!({
                "full_name": "Nguyen Van A",
                "phone": "0900000001",
                "email": "not-an-email",
                "address_line": "12 Hang Gai"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn gateway_return_settles_over_http() {
    let app = TestApp::new();
    app.seed_cart(dec!(150000), 300);

    let session_id = app
        .session_at_payment(storefront_checkout::models::PaymentMethod::CreditGateway)
        .await;
    app.coordinator.place_order(session_id).await.unwrap();
    let order_number = app.orders.order_numbers().pop().unwrap();

    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/payment/return?user_id={}&order_number={}&response_code=00&transaction_no=TXN-9",
                app.user_id, order_number
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["outcome"]["success"], true);
    assert_eq!(body["data"]["order"]["order_number"], order_number.as_str());
}

#[tokio::test]
async fn unknown_session_returns_404() {
    let app = TestApp::new();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
