//! Checkout and order-placement core for the juice storefront.
//!
//! The flow is cart -> validation -> pricing -> order write -> settlement.
//! Validation repairs the cart against the live catalog, pricing applies the
//! fixed tax/shipping rules, the order writer commits header, line snapshots,
//! stock decrements and (for wallet payments) the debit in one transaction,
//! and PayPal settles through its own create/capture endpoint pair.

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

/// Shared application state handed to every handler.
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

/// Versioned API routes.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/carts/:user_id", handlers::carts::carts_routes())
        .nest("/checkout/:user_id", handlers::checkout::checkout_routes())
        .nest("/orders", handlers::orders::orders_routes())
}

/// Full application router with middleware applied.
pub fn app_router(state: Arc<AppState>) -> Router {
    use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

    Router::new()
        .route("/", get(|| async { "juicebar-api up" }))
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    Json(json!({
        "status": db_status,
        "service": "juicebar-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
