//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistrarError {
    // ─── Validation (client-caused) ──────────────────────
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Registration is closed for event {0}")]
    RegistrationClosed(String),

    #[error("No slots left for event {0}")]
    CapacityExceeded(String),

    #[error("User is not authenticated")]
    Unauthenticated,

    #[error("Invalid fee configured for event {0}")]
    InvalidFee(String),

    #[error("Invalid cart item: {0}")]
    InvalidCartItem(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // ─── Payment flow ────────────────────────────────────
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Invalid signature")]
    SignatureMismatch,

    #[error("Database update failed: {0}")]
    Persistence(String),

    #[error("Unknown order: {0}")]
    OrderNotFound(String),

    #[error("Unknown registration: {0}")]
    RegistrationNotFound(String),

    // ─── Infrastructure ──────────────────────────────────
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RegistrarError {
    /// Stable machine-readable code returned alongside the error message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::RegistrationClosed(_) => "registration_closed",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidFee(_) => "invalid_fee",
            Self::InvalidCartItem(_) => "invalid_cart_item",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::Gateway(_) => "payment_gateway_error",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Persistence(_) => "persistence_error",
            Self::OrderNotFound(_) => "order_not_found",
            Self::RegistrationNotFound(_) => "registration_not_found",
            Self::Database(_) | Self::Migrate(_) => "database_error",
            Self::Http(_) => "http_error",
            Self::Json(_) => "json_error",
            Self::Config(_) => "config_error",
        }
    }

    /// True for failures caused by the caller's input rather than by us or a
    /// collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::RegistrationClosed(_)
                | Self::CapacityExceeded(_)
                | Self::Unauthenticated
                | Self::InvalidFee(_)
                | Self::InvalidCartItem(_)
                | Self::InvalidAmount(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistrarError>;
