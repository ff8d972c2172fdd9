//! Order initiator: turns a rupee amount into a gateway order and records
//! it locally so the verifier has something to settle.

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{error, info};
use uuid::Uuid;

use crate::db;
use crate::errors::{RegistrarError, Result};
use crate::gateway::{GatewayOrder, OrderRequest, PaymentGateway};

pub struct OrderInitiator {
    pool: SqlitePool,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
}

impl OrderInitiator {
    pub fn new(pool: SqlitePool, gateway: Arc<dyn PaymentGateway>, currency: String) -> Self {
        Self {
            pool,
            gateway,
            currency,
        }
    }

    /// Create a gateway order for `amount_rupees` and persist a matching
    /// payment record in `created` state.
    ///
    /// The gateway order is returned exactly as the gateway produced it.
    pub async fn create_order(&self, amount_rupees: f64) -> Result<GatewayOrder> {
        let amount = to_paise(amount_rupees)?;
        let receipt = new_receipt();

        let order = self
            .gateway
            .create_order(OrderRequest {
                amount,
                currency: self.currency.clone(),
                receipt: receipt.clone(),
            })
            .await
            .map_err(|e| match e {
                RegistrarError::Gateway(_) => e,
                other => RegistrarError::Gateway(other.to_string()),
            })?;

        if let Err(e) = db::insert_payment(&self.pool, &order, &receipt).await {
            // The gateway order exists but we have no record of it; a callback
            // for it will be reported as an unknown order.
            error!("Order {} created but not recorded: {e}", order.id);
            return Err(RegistrarError::Persistence(e.to_string()));
        }

        info!(
            "Created order {} for {} {} ({receipt})",
            order.id, order.amount, order.currency
        );
        Ok(order)
    }
}

/// Convert rupees to paise. The amount must be a positive, finite number.
pub fn to_paise(amount_rupees: f64) -> Result<i64> {
    if !amount_rupees.is_finite() || amount_rupees <= 0.0 {
        return Err(RegistrarError::InvalidAmount(format!(
            "amount must be a positive number of rupees, got {amount_rupees}"
        )));
    }
    let paise = (amount_rupees * 100.0).round();
    if paise < 1.0 || paise > i64::MAX as f64 {
        return Err(RegistrarError::InvalidAmount(format!(
            "amount {amount_rupees} is out of range"
        )));
    }
    Ok(paise as i64)
}

/// Receipt ids are capped at 40 characters by the gateway; `receipt_` plus a
/// simple-format UUID is exactly 40.
fn new_receipt() -> String {
    format!("receipt_{}", Uuid::new_v4().simple())
}
