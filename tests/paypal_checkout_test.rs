//! Integration tests for the two-phase PayPal flow (create, approve out of
//! band, capture) and the background reclaim of abandoned checkouts.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_status, TestApp};
use chrono::{Duration, Utc};
use juicebar_api::entities::{order, Order, OrderStatus, PaymentStatus, Product};
use juicebar_api::services::sweep::PendingOrderSweep;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

async fn mount_create(server: &MockServer, paypal_order_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": paypal_order_id,
            "status": "CREATED",
            "links": [
                {"href": "https://paypal.test/approve", "rel": "approve", "method": "GET"}
            ],
        })))
        .mount(server)
        .await;
}

/// Drives the create endpoint for a freshly seeded cart, returning the
/// response body.
async fn create_paypal_order(app: &TestApp, user_id: Uuid, address_id: Uuid) -> Value {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/orders"),
            Some(json!({ "shipping_address_id": address_id })),
        )
        .await;
    assert_status(response, StatusCode::CREATED).await
}

#[tokio::test]
async fn paypal_create_then_capture_settles_the_order() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-TEST-1").await;
    // Exactly one capture call must reach the gateway; the repeat capture
    // below short-circuits on the already-paid order.
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PP-TEST-1/capture"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "status": "COMPLETED" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-OJ", dec!(20.00), 10).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 3).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    assert_eq!(body["id"], "PP-TEST-1");
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(body["approve_url"], "https://paypal.test/approve");

    // The local order is pending with stock held and the pair recorded.
    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    assert_eq!(stored.paypal_order_id.as_deref(), Some("PP-TEST-1"));
    let shelf = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shelf.stock_quantity, 7);

    let capture = json!({ "paypal_order_id": "PP-TEST-1", "order_id": order_id });
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/capture"),
            Some(capture.clone()),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["redirect"], format!("/order-confirmation/{order_id}"));

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Paid);
    assert_eq!(stored.status, OrderStatus::Processing);

    // Replayed capture returns the same redirect without a gateway call.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/capture"),
            Some(capture),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["redirect"], format!("/order-confirmation/{order_id}"));
}

#[tokio::test]
async fn capture_with_mismatched_pair_conflicts() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-TEST-2").await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-GD", dec!(15.00), 5).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 1).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    let order_id = body["order_id"].as_str().unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/capture"),
            Some(json!({ "paypal_order_id": "PP-SOMEONE-ELSE", "order_id": order_id })),
        )
        .await;
    assert_status(response, StatusCode::CONFLICT).await;
}

#[tokio::test]
async fn declined_capture_leaves_the_order_pending() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-TEST-3").await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PP-TEST-3/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "status": "DECLINED" })))
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-CB", dec!(15.00), 5).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 1).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/capture"),
            Some(json!({ "paypal_order_id": "PP-TEST-3", "order_id": order_id })),
        )
        .await;
    let body = assert_status(response, StatusCode::PAYMENT_REQUIRED).await;
    assert!(body["error"].as_str().unwrap().contains("DECLINED"));

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn failed_gateway_create_cancels_the_local_order() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "message": "internal error" })),
        )
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-ERR", dec!(10.00), 4).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 2).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/orders"),
            Some(json!({ "shipping_address_id": address.id })),
        )
        .await;
    let body = assert_status(response, StatusCode::BAD_GATEWAY).await;
    assert!(body["error"].as_str().unwrap().contains("internal error"));

    // The local order was cancelled and its units put back.
    let orders = Order::find().all(&*app.state.db).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
    let shelf = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shelf.stock_quantity, 4);
}

#[tokio::test]
async fn malformed_gateway_reply_maps_to_bad_gateway() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-HTML", dec!(10.00), 4).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 1).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/orders"),
            Some(json!({ "shipping_address_id": address.id })),
        )
        .await;
    let body = assert_status(response, StatusCode::BAD_GATEWAY).await;
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn paypal_without_credentials_is_rejected() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-OFF", dec!(10.00), 4).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 1).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/orders"),
            Some(json!({ "shipping_address_id": address.id })),
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}

#[tokio::test]
async fn capture_racing_a_cancellation_does_not_resurrect_the_order() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-RACE").await;
    // The gateway still completes the capture; the order was reclaimed
    // while the buyer sat on the approval page.
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PP-RACE/capture"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "status": "COMPLETED" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-RACE", dec!(12.00), 5).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 2).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    // The reclaim lands first: stock goes back on the shelf.
    assert!(app
        .state
        .services
        .orders
        .cancel_and_restock(order_id, "paypal approval window expired")
        .await
        .unwrap());

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{user_id}/paypal/capture"),
            Some(json!({ "paypal_order_id": "PP-RACE", "order_id": order_id })),
        )
        .await;
    let body = assert_status(response, StatusCode::CONFLICT).await;
    assert!(body["error"].as_str().unwrap().contains("refunded"));

    // The order stays cancelled and unpaid; the restocked units are not
    // counted as sold a second time.
    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
    let shelf = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shelf.stock_quantity, 5);
}

#[tokio::test]
async fn capture_from_another_user_is_rejected() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-OWN").await;
    // The ownership check fires before any gateway call.
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/PP-OWN/capture"))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "status": "COMPLETED" })),
        )
        .expect(0)
        .mount(&server)
        .await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-OWN", dec!(12.00), 5).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 1).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    let intruder = Uuid::new_v4();
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{intruder}/paypal/capture"),
            Some(json!({ "paypal_order_id": "PP-OWN", "order_id": order_id })),
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn sweep_reclaims_expired_pending_orders_only() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_create(&server, "PP-STALE").await;

    let app = TestApp::with_paypal(&server.uri()).await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("PP-SWEEP", dec!(12.00), 6).await;
    let address = app.seed_address(user_id).await;
    app.seed_cart_line(user_id, product.id, 2).await;

    let body = create_paypal_order(&app, user_id, address.id).await;
    let order_id: Uuid = body["order_id"].as_str().unwrap().parse().unwrap();

    let sweep = PendingOrderSweep::new(
        app.state.db.clone(),
        app.state.services.orders.clone(),
        &app.state.config.checkout,
    );

    // Fresh order: inside the TTL, nothing happens.
    assert_eq!(sweep.sweep_once().await.unwrap(), 0);

    // Backdate past the TTL and sweep again.
    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: order::ActiveModel = stored.into();
    active.created_at = Set(Utc::now() - Duration::hours(2));
    active.update(&*app.state.db).await.unwrap();

    assert_eq!(sweep.sweep_once().await.unwrap(), 1);

    let stored = Order::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    let shelf = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(shelf.stock_quantity, 6);

    // A second pass finds nothing left to do.
    assert_eq!(sweep.sweep_once().await.unwrap(), 0);
}
