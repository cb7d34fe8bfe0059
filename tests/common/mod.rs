use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use juicebar_api::{
    config::{AppConfig, PayPalConfig},
    db,
    entities::{
        address, cart_item, product, wallet, AddressModel, ProductModel, ProductStatus,
        WalletModel,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::payments::{PaymentGateway, PayPalClient},
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Helper harness for spinning up an application backed by a throwaway
/// SQLite database file.
pub struct TestApp {
    router: Router,
    pub state: Arc<AppState>,
    db_file: String,
    _event_task: tokio::task::JoinHandle<()>,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_file);
    }
}

impl TestApp {
    /// Construct a new test application with fresh database state and no
    /// payment gateway.
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Same, but with a PayPal client pointed at a mock server.
    pub async fn with_paypal(api_base: &str) -> Self {
        Self::build(Some(api_base.to_string())).await
    }

    async fn build(paypal_api_base: Option<String>) -> Self {
        let db_file = format!("juicebar_test_{}.db", Uuid::new_v4().simple());
        let _ = std::fs::remove_file(&db_file);

        let mut cfg = AppConfig::new(
            format!("sqlite://{db_file}?mode=rwc"),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        if let Some(api_base) = paypal_api_base {
            cfg.paypal = PayPalConfig {
                environment: "sandbox".to_string(),
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                api_base: Some(api_base),
                currency: "USD".to_string(),
            };
        }

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let config = Arc::new(cfg);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway: Option<Arc<dyn PaymentGateway>> = if config.paypal.is_configured() {
            Some(Arc::new(
                PayPalClient::new(config.paypal.clone()).expect("paypal client"),
            ))
        } else {
            None
        };

        let services =
            AppServices::new(db.clone(), config.clone(), event_sender.clone(), gateway);
        let state = Arc::new(AppState {
            db,
            config,
            event_sender,
            services,
        });
        let router = juicebar_api::app_router(state.clone());

        Self {
            router,
            state,
            db_file,
            _event_task: event_task,
        }
    }

    /// Issue a JSON request against the in-memory router.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder
                    .body(Body::from(json.to_string()))
                    .expect("request body")
            }
            None => builder.body(Body::empty()).expect("request body"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn seed_product(&self, sku: &str, price: Decimal, stock: i32) -> ProductModel {
        self.seed_product_full(sku, price, None, stock, true, ProductStatus::Active)
            .await
    }

    pub async fn seed_product_full(
        &self,
        sku: &str,
        price: Decimal,
        sale_price: Option<Decimal>,
        stock: i32,
        is_active: bool,
        status: ProductStatus,
    ) -> ProductModel {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("Juice {}", sku)),
            sku: Set(sku.to_string()),
            description: Set("Cold-pressed, no additives".to_string()),
            price: Set(price),
            sale_price: Set(sale_price),
            stock_quantity: Set(stock),
            sales_count: Set(0),
            is_active: Set(is_active),
            status: Set(status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_wallet(&self, user_id: Uuid, balance: Decimal) -> WalletModel {
        wallet::ActiveModel {
            user_id: Set(user_id),
            balance: Set(balance),
            updated_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed wallet")
    }

    pub async fn seed_address(&self, user_id: Uuid) -> AddressModel {
        address::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            first_name: Set("Iris".to_string()),
            last_name: Set("Okafor".to_string()),
            line1: Set("12 Orchard Lane".to_string()),
            line2: Set(None),
            city: Set("Portland".to_string()),
            province: Set("OR".to_string()),
            postal_code: Set("97201".to_string()),
            phone: Set(None),
            is_default: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    pub async fn seed_cart_line(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        let now = Utc::now();
        cart_item::ActiveModel {
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed cart line");
    }
}

/// Decode a response body as JSON.
pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Assert helper that surfaces the body on status mismatch.
pub async fn assert_status(response: Response, expected: StatusCode) -> Value {
    let status = response.status();
    let body = response_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {body}");
    body
}
