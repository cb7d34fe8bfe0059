use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Fixed-rate checkout pricing rules.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Tax rate applied to the subtotal (0.08 = 8%).
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Subtotal at or above which shipping is free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    /// Flat shipping fee below the free-shipping threshold.
    #[serde(default = "default_shipping_flat_rate")]
    pub shipping_flat_rate: Decimal,

    /// Per-line quantity ceiling; lines above it are removed by the
    /// validator's eligibility pass. Zero disables the check.
    #[serde(default)]
    pub max_quantity_per_order: i32,

    /// Minutes a PayPal order may sit `pending` before the sweep cancels
    /// it and restocks its lines.
    #[serde(default = "default_pending_paypal_ttl")]
    pub pending_paypal_ttl_minutes: i64,

    /// How often the pending-order sweep runs.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            shipping_flat_rate: default_shipping_flat_rate(),
            max_quantity_per_order: 0,
            pending_paypal_ttl_minutes: default_pending_paypal_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Admin-controlled payment method toggles. The first enabled method in
/// preference order (wallet, card, paypal, cod) is the storefront default.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PaymentMethodsConfig {
    #[serde(default = "default_true")]
    pub wallet: bool,
    #[serde(default = "default_true")]
    pub card: bool,
    #[serde(default = "default_true")]
    pub paypal: bool,
    #[serde(default = "default_true")]
    pub cod: bool,
}

impl Default for PaymentMethodsConfig {
    fn default() -> Self {
        Self {
            wallet: true,
            card: true,
            paypal: true,
            cod: true,
        }
    }
}

/// PayPal REST credentials and environment.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayPalConfig {
    /// "sandbox" or "live".
    #[serde(default = "default_paypal_env")]
    pub environment: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Explicit API base overrides the environment-derived one (used by
    /// tests to point the client at a local mock).
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for PayPalConfig {
    fn default() -> Self {
        Self {
            environment: default_paypal_env(),
            client_id: String::new(),
            client_secret: String::new(),
            api_base: None,
            currency: default_currency(),
        }
    }
}

impl PayPalConfig {
    pub fn api_base(&self) -> String {
        if let Some(base) = &self.api_base {
            return base.trim_end_matches('/').to_string();
        }
        if self.environment == "live" {
            "https://api-m.paypal.com".to_string()
        } else {
            "https://api-m.sandbox.paypal.com".to_string()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Application configuration with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 200))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default)]
    pub checkout: CheckoutConfig,

    #[serde(default)]
    pub payment_methods: PaymentMethodsConfig,

    #[serde(default)]
    pub paypal: PayPalConfig,
}

impl AppConfig {
    /// Minimal constructor used by tests.
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            checkout: CheckoutConfig::default(),
            payment_methods: PaymentMethodsConfig::default(),
            paypal: PayPalConfig::default(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development" || self.environment == "test"
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Storefront default payment method: first enabled in preference order.
    pub fn default_payment_method(&self) -> Option<crate::entities::PaymentMethod> {
        use crate::entities::PaymentMethod;
        let order = [
            (self.payment_methods.wallet, PaymentMethod::Wallet),
            (self.payment_methods.card, PaymentMethod::Card),
            (self.payment_methods.paypal, PaymentMethod::Paypal),
            (self.payment_methods.cod, PaymentMethod::Cod),
        ];
        order
            .into_iter()
            .find_map(|(enabled, method)| enabled.then_some(method))
    }

    pub fn method_enabled(&self, method: crate::entities::PaymentMethod) -> bool {
        use crate::entities::PaymentMethod;
        match method {
            PaymentMethod::Wallet => self.payment_methods.wallet,
            PaymentMethod::Card => self.payment_methods.card,
            PaymentMethod::Paypal => self.payment_methods.paypal,
            PaymentMethod::Cod => self.payment_methods.cod,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_tax_rate() -> Decimal {
    Decimal::new(8, 2) // 0.08
}

fn default_free_shipping_threshold() -> Decimal {
    Decimal::from(50)
}

fn default_shipping_flat_rate() -> Decimal {
    Decimal::new(999, 2) // 9.99
}

fn default_pending_paypal_ttl() -> i64 {
    60
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

fn default_paypal_env() -> String {
    "sandbox".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Initialize tracing with env-filter; RUST_LOG overrides the configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("juicebar_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::new(filter_directive);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Loads configuration from `config/{default,<env>}.toml` files layered
/// under `APP__*` environment variables.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://juicebar.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
