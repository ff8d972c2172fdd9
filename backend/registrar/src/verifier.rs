//! Payment verifier: authenticates the gateway's completion callback and
//! settles the order.

use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db;
use crate::errors::{RegistrarError, Result};
use crate::models::Settlement;
use crate::signature;

/// Parameters the checkout widget hands back after a successful payment.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCallback {
    #[serde(rename = "razorpay_order_id")]
    pub order_id: String,
    #[serde(rename = "razorpay_payment_id")]
    pub payment_id: String,
    #[serde(rename = "razorpay_signature")]
    pub signature: String,
}

pub struct PaymentVerifier {
    pool: SqlitePool,
    key_secret: String,
}

impl PaymentVerifier {
    pub fn new(pool: SqlitePool, key_secret: String) -> Self {
        Self { pool, key_secret }
    }

    /// Check the callback signature and, if it is genuine, settle the order.
    ///
    /// A forged or corrupted signature returns
    /// [`RegistrarError::SignatureMismatch`] without touching the database.
    /// Storage failures after a good signature are reported as
    /// [`RegistrarError::Persistence`]; the reconciler picks up anything
    /// left half-done.
    pub async fn verify_payment(&self, callback: &PaymentCallback) -> Result<Settlement> {
        for (field, value) in [
            ("razorpay_order_id", &callback.order_id),
            ("razorpay_payment_id", &callback.payment_id),
            ("razorpay_signature", &callback.signature),
        ] {
            if value.trim().is_empty() {
                return Err(RegistrarError::InvalidInput(format!("{field} is required")));
            }
        }

        if !signature::verify_signature(
            self.key_secret.as_bytes(),
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        ) {
            warn!(
                "Rejected payment callback for order {}: signature mismatch",
                callback.order_id
            );
            return Err(RegistrarError::SignatureMismatch);
        }

        let outcome = db::settle_order(
            &self.pool,
            &callback.order_id,
            &callback.payment_id,
            &callback.signature,
        )
        .await
        .map_err(|e| match e {
            RegistrarError::OrderNotFound(_) => e,
            other => {
                error!(
                    "Verified payment {} for order {} could not be recorded: {other}",
                    callback.payment_id, callback.order_id
                );
                RegistrarError::Persistence(other.to_string())
            }
        })?;

        match &outcome {
            Settlement::Settled {
                registration_id: Some(id),
            } => info!(
                "Order {} settled by payment {}; registration {id} confirmed",
                callback.order_id, callback.payment_id
            ),
            Settlement::Settled {
                registration_id: None,
            } => warn!(
                "Order {} settled by payment {} but no registration references it",
                callback.order_id, callback.payment_id
            ),
            Settlement::AlreadySettled { payment_id } => {
                if payment_id.as_deref() != Some(callback.payment_id.as_str()) {
                    warn!(
                        "Order {} already settled by {:?}; ignoring payment {}",
                        callback.order_id, payment_id, callback.payment_id
                    );
                } else {
                    info!("Duplicate callback for order {} ignored", callback.order_id);
                }
            }
        }

        Ok(outcome)
    }
}
