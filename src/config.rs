use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Loaded from `config/default` plus an environment-specific file, with
/// `APP__`-prefixed environment variables overriding both. Every field has
/// a default so the service runs with no configuration present.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging).
    #[serde(default)]
    pub log_json: bool,

    /// Flat tax rate applied to the subtotal.
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Fixed fee substituted when the rate service cannot be consulted or
    /// returns a zero fee.
    #[serde(default = "default_fallback_shipping_fee")]
    pub fallback_shipping_fee: Decimal,

    /// Subtotal at or above which shipping is free.
    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    /// Whole-submission timeout for a place-order attempt (1-300 s).
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_submission_timeout_secs")]
    pub submission_timeout_secs: u64,

    /// Age after which an ongoing-order marker is treated as abandoned.
    #[serde(default = "default_marker_stale_secs")]
    pub marker_stale_secs: i64,

    /// Age after which an abandoned checkout session is swept.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: i64,

    /// Identifier of the single supported credit gateway.
    #[serde(default = "default_gateway_id")]
    pub gateway_id: String,

    /// Gateway response code denoting a successful payment; every other
    /// code (including user cancellation) is a failure.
    #[serde(default = "default_gateway_success_code")]
    pub gateway_success_code: String,
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
fn default_tax_rate() -> Decimal {
    dec!(0.10)
}
fn default_fallback_shipping_fee() -> Decimal {
    dec!(30000)
}
fn default_free_shipping_threshold() -> Decimal {
    dec!(500000)
}
fn default_submission_timeout_secs() -> u64 {
    30
}
fn default_marker_stale_secs() -> i64 {
    300
}
fn default_session_ttl_secs() -> i64 {
    1800
}
fn default_gateway_id() -> String {
    "VNPAY".to_string()
}
fn default_gateway_success_code() -> String {
    "00".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            tax_rate: default_tax_rate(),
            fallback_shipping_fee: default_fallback_shipping_fee(),
            free_shipping_threshold: default_free_shipping_threshold(),
            submission_timeout_secs: default_submission_timeout_secs(),
            marker_stale_secs: default_marker_stale_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            gateway_id: default_gateway_id(),
            gateway_success_code: default_gateway_success_code(),
        }
    }
}

impl AppConfig {
    pub fn submission_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.submission_timeout_secs)
    }

    pub fn marker_stale_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.marker_stale_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.session_ttl_secs)
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
    Ok(cfg)
}

/// Initializes the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_checkout={},tower_http=info", level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tax_rate, dec!(0.10));
        assert_eq!(cfg.submission_timeout_secs, 30);
        assert_eq!(cfg.marker_stale_secs, 300);
        assert_eq!(cfg.gateway_success_code, "00");
    }
}
