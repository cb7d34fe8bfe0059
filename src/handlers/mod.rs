/// HTTP handlers, one module per resource.
pub mod carts;
pub mod checkout;
pub mod common;
pub mod orders;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::payments::PaymentGateway;
use crate::services::validation::CartValidator;
use crate::services::{CartService, CheckoutService, OrderService, WalletService};
use std::sync::Arc;

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub wallet: Arc<WalletService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        config: Arc<AppConfig>,
        event_sender: Arc<EventSender>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let validator = Arc::new(CartValidator::new(
            db.clone(),
            event_sender.clone(),
            config.checkout.max_quantity_per_order,
        ));
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let wallet = Arc::new(WalletService::new(db.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            config,
            validator,
            orders.clone(),
            wallet.clone(),
            gateway,
            event_sender,
        ));

        Self {
            cart: Arc::new(CartService::new(db)),
            checkout,
            orders,
            wallet,
        }
    }
}
