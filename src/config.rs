use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::info;
use validator::{Validate, ValidationError};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Payment gateway credentials and endpoint configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct GatewayConfig {
    /// API base URL of the payment gateway
    #[serde(default = "default_gateway_base_url")]
    pub base_url: String,

    /// Gateway key id (basic-auth username)
    pub key_id: String,

    /// Gateway key secret; also the shared secret for callback signatures
    pub key_secret: String,

    /// Secret used to verify webhook payload signatures
    pub webhook_secret: Option<String>,

    /// Allowed clock skew for signed webhook timestamps, in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_base_url(),
            key_id: "rzp_test_key".to_string(),
            key_secret: "rzp_test_secret".to_string(),
            webhook_secret: None,
            webhook_tolerance_secs: default_webhook_tolerance(),
        }
    }
}

/// Application configuration with validation.
///
/// Values are resolved in order: built-in defaults, `config/default.toml`,
/// `config/{environment}.toml`, then `APP__`-prefixed environment
/// variables (e.g. `APP__DATABASE_URL`).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret (minimum 32 characters)
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration: u64,

    /// Server bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// ISO 4217 currency code for the storefront
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Tax rate applied to the discounted subtotal
    #[serde(default = "default_tax_rate")]
    #[validate(custom(function = "validate_rate"))]
    pub tax_rate: f64,

    /// Order value (after discount) at which shipping becomes free
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: f64,

    /// Flat shipping fee below the free-shipping threshold
    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: f64,

    /// Days of inactivity before a cart expires (rolling TTL)
    #[serde(default = "default_cart_ttl_days")]
    pub cart_ttl_days: i64,

    /// Days after delivery during which a return may be requested
    #[serde(default = "default_return_window_days")]
    pub return_window_days: i64,

    /// Payment gateway settings
    #[serde(default)]
    #[validate(nested)]
    pub gateway: GatewayConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_jwt_expiration() -> u64 {
    3600
}
fn default_currency() -> String {
    "INR".to_string()
}
fn default_tax_rate() -> f64 {
    0.18
}
fn default_free_shipping_threshold() -> f64 {
    500.0
}
fn default_shipping_fee() -> f64 {
    49.0
}
fn default_cart_ttl_days() -> i64 {
    7
}
fn default_return_window_days() -> i64 {
    7
}
fn default_gateway_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}
fn default_webhook_tolerance() -> u64 {
    300
}

fn validate_rate(rate: f64) -> Result<(), ValidationError> {
    if rate.is_finite() && (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be a finite value between 0.0 and 1.0".into());
        Err(err)
    }
}

impl AppConfig {
    /// Loads configuration from files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let mut builder = Config::builder()
            .set_default("database_url", "postgres://localhost/storefront")?
            .set_default("jwt_secret", DEV_DEFAULT_JWT_SECRET)?
            .set_default("environment", environment.clone())?;

        let default_path = Path::new(CONFIG_DIR).join("default.toml");
        if default_path.exists() {
            builder = builder.add_source(File::from(default_path));
        }
        let env_path = Path::new(CONFIG_DIR).join(format!("{environment}.toml"));
        if env_path.exists() {
            builder = builder.add_source(File::from(env_path));
        }

        let settings: AppConfig = builder
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?
            .try_deserialize()?;

        settings
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        info!(
            environment = %settings.environment,
            port = settings.port,
            "Configuration loaded"
        );
        Ok(settings)
    }

    /// Minimal configuration for tests and tooling.
    pub fn for_tests(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: DEV_DEFAULT_JWT_SECRET.to_string(),
            jwt_expiration: 3600,
            host: "127.0.0.1".to_string(),
            port: 18080,
            environment: "test".to_string(),
            log_level: "debug".to_string(),
            log_json: false,
            auto_migrate: true,
            currency: default_currency(),
            tax_rate: default_tax_rate(),
            free_shipping_threshold: default_free_shipping_threshold(),
            shipping_fee: default_shipping_fee(),
            cart_ttl_days: default_cart_ttl_days(),
            return_window_days: default_return_window_days(),
            gateway: GatewayConfig::default(),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
