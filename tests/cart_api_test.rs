//! Integration tests for the cart endpoints.

mod common;

use axum::http::{Method, StatusCode};
use common::{assert_status, TestApp};
use juicebar_api::entities::ProductStatus;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn add_get_update_remove_roundtrip() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("CART-1", dec!(4.50), 20).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": product.id, "quantity": 2 })),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["quantity"], 2);
    // Compare numerically: the storage backend does not owe us a scale.
    let subtotal: Decimal = body["subtotal"].as_str().unwrap().parse().unwrap();
    assert_eq!(subtotal, dec!(9.00));

    // Adding the same product again merges into the existing line.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": product.id, "quantity": 3 })),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["quantity"], 5);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/carts/{user_id}/items/{}", product.id),
            Some(json!({ "quantity": 1 })),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["quantity"], 1);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/carts/{user_id}/items/{}", product.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{user_id}"), None)
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());

    // Removing a line that is already gone is a 404.
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/carts/{user_id}/items/{}", product.id),
            None,
        )
        .await;
    assert_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn add_clamps_to_available_stock() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("CART-LOW", dec!(4.50), 3).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": product.id, "quantity": 10 })),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert_eq!(body["items"][0]["quantity"], 3);
}

#[tokio::test]
async fn unsellable_products_cannot_be_added() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let archived = app
        .seed_product_full(
            "CART-ARCH",
            dec!(4.50),
            None,
            10,
            true,
            ProductStatus::Archived,
        )
        .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": archived.id, "quantity": 1 })),
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": Uuid::new_v4(), "quantity": 1 })),
        )
        .await;
    assert_status(response, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn zero_quantity_update_removes_the_line() {
    let app = TestApp::new().await;
    let user_id = Uuid::new_v4();
    let product = app.seed_product("CART-ZERO", dec!(4.50), 10).await;
    app.seed_cart_line(user_id, product.id, 2).await;

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/carts/{user_id}/items/{}", product.id),
            Some(json!({ "quantity": 0 })),
        )
        .await;
    let body = assert_status(response, StatusCode::OK).await;
    assert!(body["items"].as_array().unwrap().is_empty());

    // Quantity rejections come from request validation.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{user_id}/items"),
            Some(json!({ "product_id": product.id, "quantity": 0 })),
        )
        .await;
    assert_status(response, StatusCode::BAD_REQUEST).await;
}
