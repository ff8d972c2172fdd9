//! Razorpay REST client for creating orders on the payment gateway.
//!
//! The gateway sits behind the [`PaymentGateway`] trait so the order
//! initiator can be driven by a fake in tests. Calls are never retried: a
//! failed order creation is reported to the caller, who can simply try the
//! checkout again.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::errors::{RegistrarError, Result};

/// Boxed future returned by gateway calls.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// ─────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────

/// Body of `POST /v1/orders`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Minor units (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
}

/// Order as returned by the gateway. Passed back to the client verbatim so
/// the checkout widget can be opened with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    description: Option<String>,
}

// ─────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────

pub trait PaymentGateway: Send + Sync {
    /// Create an order on the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrarError::Gateway`] for any transport, auth or
    /// validation failure reported by the gateway.
    fn create_order(&self, request: OrderRequest) -> GatewayFuture<'_, GatewayOrder>;
}

// ─────────────────────────────────────────────────────────
// Razorpay
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RazorpayGateway {
    client: Client,
    config: GatewayConfig,
}

impl RazorpayGateway {
    pub fn new(client: Client, config: GatewayConfig) -> Self {
        Self { client, config }
    }

    /// Build the shared HTTP client with the configured timeout.
    pub fn http_client(config: &GatewayConfig) -> Result<Client> {
        Ok(Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?)
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_order(&self, request: OrderRequest) -> Result<GatewayOrder> {
        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Order request to gateway failed: {e}");
                RegistrarError::Gateway(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RegistrarError::Gateway(e.to_string()))?;

        if !status.is_success() {
            let message = describe_error(&body).unwrap_or_else(|| format!("HTTP {status}"));
            warn!(%status, "Gateway rejected order {}: {message}", request.receipt);
            return Err(RegistrarError::Gateway(message));
        }

        let order: GatewayOrder = serde_json::from_str(&body)
            .map_err(|e| RegistrarError::Gateway(format!("unreadable order response: {e}")))?;

        debug!(
            "Gateway created order {} ({} {})",
            order.id, order.amount, order.currency
        );
        Ok(order)
    }
}

impl PaymentGateway for RazorpayGateway {
    fn create_order(&self, request: OrderRequest) -> GatewayFuture<'_, GatewayOrder> {
        Box::pin(self.post_order(request))
    }
}

/// Pull a human-readable message out of a Razorpay error body.
fn describe_error(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    let error = envelope.error?;
    match (error.description, error.code) {
        (Some(description), _) => Some(description),
        (None, Some(code)) => Some(code),
        (None, None) => None,
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
