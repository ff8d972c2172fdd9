//! Cart checkout. Validates every selection, prices the cart from the
//! event catalogue, stores a pending registration and opens a gateway order
//! for it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{self, NewRegistration};
use crate::errors::{RegistrarError, Result};
use crate::gateway::GatewayOrder;
use crate::models::{CartItemInput, Registration, RegistrationItem, UserIdentity};
use crate::orders::{self, OrderInitiator};
use crate::validation::{validate_cart_item, validate_event_registration};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckoutRequest {
    pub user: Option<UserIdentity>,
    #[serde(default)]
    pub items: Vec<CartItemInput>,
    /// Requested team size; clamped to the smallest `max_team_size` of the
    /// selected events.
    #[serde(default)]
    pub team_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub registration: Registration,
    pub items: Vec<RegistrationItem>,
    /// Absent when every selected event is free.
    pub order: Option<GatewayOrder>,
}

pub struct Checkout {
    pool: SqlitePool,
    orders: Arc<OrderInitiator>,
}

impl Checkout {
    pub fn new(pool: SqlitePool, orders: Arc<OrderInitiator>) -> Self {
        Self { pool, orders }
    }

    pub async fn checkout(&self, request: &CheckoutRequest) -> Result<CheckoutReceipt> {
        if request.items.is_empty() {
            return Err(RegistrarError::InvalidInput("cart is empty".to_string()));
        }

        let mut seen = HashSet::new();
        let mut items = Vec::with_capacity(request.items.len());
        let mut intents = Vec::with_capacity(request.items.len());

        for input in &request.items {
            let cart_item = validate_cart_item(input)?;
            if !seen.insert(cart_item.event_id.clone()) {
                return Err(RegistrarError::InvalidCartItem(format!(
                    "{} appears more than once",
                    cart_item.event_id
                )));
            }

            let event = db::get_event(&self.pool, &cart_item.event_id).await?;
            if event.is_none() {
                return Err(RegistrarError::InvalidInput(format!(
                    "unknown event {}",
                    cart_item.event_id
                )));
            }
            let intent = validate_event_registration(event.as_ref(), request.user.as_ref())?;

            if (intent.price - cart_item.price).abs() > f64::EPSILON {
                warn!(
                    "Cart price {} for {} differs from catalogue fee {}; using catalogue fee",
                    cart_item.price, intent.event_id, intent.price
                );
            }

            items.push(RegistrationItem {
                event_id: intent.event_id.clone(),
                price: intent.price,
            });
            intents.push(intent);
        }

        // Every intent carries the same user id.
        let user_id = intents[0].user_id.clone();
        let total: f64 = items.iter().map(|i| i.price).sum();
        let max_team = intents.iter().map(|i| i.max_team_size).min().unwrap_or(1);
        let team_size = request.team_size.unwrap_or(1).clamp(1, max_team);
        let registration_type = if intents.len() == 1 {
            intents[0].registration_type.clone()
        } else {
            "bundle".to_string()
        };

        // A positive total below half a paisa cannot be charged.
        if total > 0.0 {
            orders::to_paise(total).map_err(|_| {
                let events: Vec<&str> = items.iter().map(|i| i.event_id.as_str()).collect();
                RegistrarError::InvalidFee(events.join(","))
            })?;
        }

        let registration_id = Uuid::new_v4().to_string();
        db::insert_registration(
            &self.pool,
            &NewRegistration {
                id: registration_id.clone(),
                user_id: user_id.clone(),
                fee: total,
                registration_type,
                team_size,
                items: items.clone(),
            },
        )
        .await?;

        let order = if total > 0.0 {
            let order = self.orders.create_order(total).await?;
            db::link_order(&self.pool, &registration_id, &order.id).await?;
            Some(order)
        } else {
            db::confirm_free_registration(&self.pool, &registration_id).await?;
            None
        };

        info!(
            "Registration {registration_id} for user {user_id}: {} events, total {total}",
            items.len()
        );

        let registration = db::get_registration(&self.pool, &registration_id)
            .await?
            .ok_or_else(|| RegistrarError::RegistrationNotFound(registration_id.clone()))?;

        Ok(CheckoutReceipt {
            registration,
            items,
            order,
        })
    }
}
