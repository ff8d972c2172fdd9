//! Application configuration loaded from environment variables.

use crate::errors::{RegistrarError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Gateway credentials and endpoint.
    pub gateway: GatewayConfig,
    /// Path to the SQLite database file
    pub database_url: String,
    /// Port for the REST API server
    pub api_port: u16,
    /// How often (in seconds) the reconciler scans for stuck registrations
    pub reconcile_interval_secs: u64,
    /// Age (in seconds) after which an unpaid registration is cancelled; 0 disables expiry
    pub pending_expiry_secs: u64,
}

/// Everything the order initiator and the payment verifier need to talk to
/// (and authenticate) Razorpay.
#[derive(Clone)]
pub struct GatewayConfig {
    /// Razorpay API base URL (e.g. https://api.razorpay.com)
    pub base_url: String,
    /// Public key id, used as the basic-auth username
    pub key_id: String,
    /// Shared secret, used as the basic-auth password and the HMAC key
    pub key_secret: String,
    /// ISO currency code for created orders
    pub currency: String,
    /// Outbound request timeout
    pub timeout_secs: u64,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("currency", &self.currency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            gateway: GatewayConfig {
                base_url: env_var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
                key_id: env_var("RAZORPAY_KEY_ID").map_err(|_| {
                    RegistrarError::Config(
                        "RAZORPAY_KEY_ID environment variable is required".to_string(),
                    )
                })?,
                key_secret: env_var("RAZORPAY_KEY_SECRET").map_err(|_| {
                    RegistrarError::Config(
                        "RAZORPAY_KEY_SECRET environment variable is required".to_string(),
                    )
                })?,
                currency: env_var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
                timeout_secs: env_var("GATEWAY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .map_err(|_| RegistrarError::Config("Invalid GATEWAY_TIMEOUT_SECS".to_string()))?,
            },
            database_url: env_var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./techniverse.db".to_string()),
            api_port: env_var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| RegistrarError::Config("Invalid API_PORT".to_string()))?,
            reconcile_interval_secs: env_var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .map_err(|_| RegistrarError::Config("Invalid RECONCILE_INTERVAL_SECS".to_string()))?,
            pending_expiry_secs: env_var("PENDING_EXPIRY_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .map_err(|_| RegistrarError::Config("Invalid PENDING_EXPIRY_SECS".to_string()))?,
        })
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| RegistrarError::Config(format!("Missing env var: {key}")))
}
