use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::middleware_helpers::RetryConfig;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_GPS_MAX_DISTANCE_METERS: f64 = 150.0;
const DEFAULT_PROCESSOR_BASE_URL: &str = "https://api.stripe.com";

/// Payment processor connection settings
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentProcessorConfig {
    /// Base URL of the Stripe-compatible API
    #[serde(default = "default_processor_base_url")]
    #[validate(length(min = 1))]
    pub base_url: String,

    /// Secret API key, sent as a bearer token
    #[serde(default)]
    pub secret_key: String,

    /// Transport timeout for a single capture call
    #[serde(default = "default_processor_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,
}

impl Default for PaymentProcessorConfig {
    fn default() -> Self {
        Self {
            base_url: default_processor_base_url(),
            secret_key: String::new(),
            timeout_secs: default_processor_timeout_secs(),
        }
    }
}

/// Check-out workflow tuning
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Distance beyond which a check-out location is flagged for review
    #[serde(default = "default_gps_max_distance_meters")]
    #[validate(range(min = 1.0, max = 100000.0))]
    pub gps_max_distance_meters: f64,

    /// Nominatim-compatible search endpoint used when an address has no coordinates
    #[serde(default)]
    pub geocoder_url: Option<String>,

    /// Total attempts for the completion write, including the first
    #[serde(default = "default_persistence_retry_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub persistence_retry_attempts: u32,

    #[serde(default = "default_persistence_retry_base_delay_ms")]
    pub persistence_retry_base_delay_ms: u64,

    #[serde(default = "default_persistence_retry_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub persistence_retry_multiplier: f64,

    /// Assign completed bookings to the rebook-nudge experiment
    #[serde(default = "default_true_bool")]
    pub rebook_experiment_enabled: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            gps_max_distance_meters: default_gps_max_distance_meters(),
            geocoder_url: None,
            persistence_retry_attempts: default_persistence_retry_attempts(),
            persistence_retry_base_delay_ms: default_persistence_retry_base_delay_ms(),
            persistence_retry_multiplier: default_persistence_retry_multiplier(),
            rebook_experiment_enabled: true,
        }
    }
}

/// Outbound notification endpoints. Unset endpoints fall back to logging.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    #[serde(default)]
    pub email_endpoint: Option<String>,

    #[serde(default)]
    pub push_endpoint: Option<String>,

    #[serde(default)]
    pub admin_alert_endpoint: Option<String>,

    /// Administrator addresses that receive operational alerts
    #[serde(default)]
    pub admin_recipients: Vec<String>,
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Shared secret for verifying payment processor webhooks
    #[validate(length(min = 1))]
    pub payment_webhook_secret: String,

    /// Webhook timestamp tolerance (seconds)
    #[serde(default = "default_webhook_tolerance_secs")]
    #[validate(range(min = 1, max = 3600))]
    pub payment_webhook_tolerance_secs: u64,

    #[serde(default)]
    #[validate]
    pub processor: PaymentProcessorConfig,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,

    #[serde(default)]
    #[validate]
    pub notifications: NotificationConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything except the
    /// database URL, webhook secret and environment.
    pub fn new(database_url: String, payment_webhook_secret: String, environment: String) -> Self {
        Self {
            database_url,
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            payment_webhook_secret,
            payment_webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
            processor: PaymentProcessorConfig::default(),
            checkout: CheckoutConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Backoff used by the completion writer.
    pub fn persistence_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.checkout.persistence_retry_attempts,
            initial_delay: Duration::from_millis(self.checkout.persistence_retry_base_delay_ms),
            max_delay: Duration::from_secs(5),
            backoff_factor: self.checkout.persistence_retry_multiplier,
        }
    }

    pub fn processor_timeout(&self) -> Duration {
        Duration::from_secs(self.processor.timeout_secs)
    }

    /// Rules that depend on the environment rather than on a single field.
    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.is_development() && self.processor.secret_key.trim().is_empty() {
            let mut err = ValidationError::new("processor_secret_key");
            err.message = Some(
                "processor.secret_key must be set outside development (APP__PROCESSOR__SECRET_KEY)"
                    .into(),
            );
            errors.add("processor", err);
        }

        if !self.is_development() && self.payment_webhook_secret.trim().len() < 16 {
            let mut err = ValidationError::new("payment_webhook_secret");
            err.message = Some("payment_webhook_secret must be at least 16 characters".into());
            errors.add("payment_webhook_secret", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

/// Default value functions
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
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_webhook_tolerance_secs() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}

fn default_processor_base_url() -> String {
    DEFAULT_PROCESSOR_BASE_URL.to_string()
}

fn default_processor_timeout_secs() -> u64 {
    30
}

fn default_gps_max_distance_meters() -> f64 {
    DEFAULT_GPS_MAX_DISTANCE_METERS
}

fn default_persistence_retry_attempts() -> u32 {
    3
}

fn default_persistence_retry_base_delay_ms() -> u64 {
    100
}

fn default_persistence_retry_multiplier() -> f64 {
    2.0
}

fn default_true_bool() -> bool {
    true
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("booking_checkout_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::new(filter_directive);
    if json {
        let _ = fmt().with_env_filter(filter).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
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

    load_config_from(Path::new(CONFIG_DIR), &run_env)
}

/// Same layering as [`load_config`], reading files from `config_dir`.
pub fn load_config_from(config_dir: &Path, run_env: &str) -> Result<AppConfig, AppConfigError> {
    // payment_webhook_secret has no default; it must come from a file or the environment.
    let config = Config::builder()
        .set_default("database_url", "sqlite://bookings.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(config_dir.join("default")).required(false))
        .add_source(File::from(config_dir.join(run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("payment_webhook_secret").is_err() {
        error!("Payment webhook secret is not configured. Set APP__PAYMENT_WEBHOOK_SECRET to the processor's signing secret.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "payment_webhook_secret is required but not configured. Set APP__PAYMENT_WEBHOOK_SECRET."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;
    use tempfile::TempDir;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "whsec_integration_secret_value".into(),
            "production".into(),
        )
    }

    #[test]
    fn production_requires_processor_secret_key() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn production_with_secret_key_passes() {
        let mut cfg = base_config();
        cfg.processor.secret_key = "sk_live_example".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_missing_secret_key() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn persistence_retry_defaults_to_three_attempts_from_100ms() {
        let retry = base_config().persistence_retry();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_millis(100));
        assert_eq!(retry.backoff_factor, 2.0);
    }

    #[test]
    fn loads_layered_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            r#"
                payment_webhook_secret = "whsec_from_file"

                [checkout]
                gps_max_distance_meters = 250.0
                rebook_experiment_enabled = false
            "#,
        )
        .unwrap();
        fs::write(dir.path().join("test.toml"), "port = 9090\n").unwrap();

        let cfg = load_config_from(dir.path(), "test").unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.payment_webhook_secret, "whsec_from_file");
        assert_eq!(cfg.checkout.gps_max_distance_meters, 250.0);
        assert!(!cfg.checkout.rebook_experiment_enabled);
        assert_eq!(cfg.payment_webhook_tolerance_secs, 300);
        assert_eq!(cfg.checkout.persistence_retry_attempts, 3);
    }

    #[test]
    fn missing_webhook_secret_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = load_config_from(dir.path(), "test");
        assert_matches!(result, Err(AppConfigError::Load(_)));
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("default.toml"),
            "payment_webhook_secret = \"whsec_x\"\nlog_level = \"loud\"\n",
        )
        .unwrap();

        let result = load_config_from(dir.path(), "test");
        assert_matches!(result, Err(AppConfigError::Validation(errors)) => {
            assert!(errors.field_errors().contains_key("log_level"));
        });
    }
}
