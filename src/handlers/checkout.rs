use crate::handlers::common::{created_response, map_service_error, success_response, validate_input};
use crate::services::checkout::{CheckoutOutcome, PaypalCreateOutcome};
use crate::services::validation::RemovedItem;
use crate::{
    entities::PaymentMethod,
    errors::ApiError,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout endpoints, nested at `/checkout/:user_id`.
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/paypal/orders", post(create_paypal_order))
        .route("/paypal/capture", post(capture_paypal_order))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
    pub shipping_address_id: Uuid,
    /// Defaults to the shipping address.
    pub billing_address_id: Option<Uuid>,
    #[validate(length(max = 500, message = "notes are limited to 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaypalCheckoutRequest {
    pub shipping_address_id: Uuid,
    pub billing_address_id: Option<Uuid>,
    #[validate(length(max = 500, message = "notes are limited to 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalCaptureRequest {
    pub paypal_order_id: String,
    pub order_id: Uuid,
}

/// Body of the 409 sent when validation revised the cart: the dropped lines
/// plus where the buyer should be sent to review what is left.
#[derive(Debug, Serialize)]
struct CartRevisedBody {
    error: &'static str,
    removed_items: Vec<RemovedItem>,
    redirect: &'static str,
}

fn cart_revised_response(removed: Vec<RemovedItem>) -> Response {
    (
        StatusCode::CONFLICT,
        axum::Json(CartRevisedBody {
            error: "Some items in your cart are no longer available",
            removed_items: removed,
            redirect: "/cart",
        }),
    )
        .into_response()
}

/// Place an order paid by wallet, card or cash on delivery
async fn place_order(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let billing = payload
        .billing_address_id
        .unwrap_or(payload.shipping_address_id);

    let outcome = state
        .services
        .checkout
        .checkout(
            user_id,
            payload.payment_method,
            payload.shipping_address_id,
            billing,
            payload.notes,
        )
        .await
        .map_err(map_service_error)?;

    Ok(match outcome {
        CheckoutOutcome::Placed(order) => {
            let redirect = crate::services::checkout::confirmation_redirect(order.id);
            created_response(json!({ "order": order, "redirect": redirect }))
        }
        CheckoutOutcome::CartRevised { removed } => cart_revised_response(removed),
    })
}

/// Create a PayPal order for the current cart
async fn create_paypal_order(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<PaypalCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let billing = payload
        .billing_address_id
        .unwrap_or(payload.shipping_address_id);

    let outcome = state
        .services
        .checkout
        .create_paypal_order(user_id, payload.shipping_address_id, billing, payload.notes)
        .await
        .map_err(map_service_error)?;

    Ok(match outcome {
        PaypalCreateOutcome::Created {
            paypal_order_id,
            order_id,
            approve_url,
        } => created_response(json!({
            "id": paypal_order_id,
            "order_id": order_id,
            "approve_url": approve_url,
        })),
        PaypalCreateOutcome::CartRevised { removed } => cart_revised_response(removed),
    })
}

/// Capture an approved PayPal order
async fn capture_paypal_order(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<PaypalCaptureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .services
        .checkout
        .capture_paypal_order(user_id, &payload.paypal_order_id, payload.order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(json!({ "redirect": result.redirect })))
}
