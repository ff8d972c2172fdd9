//! Records owned (or read) by the registrar, plus the request-side shapes
//! that flow through the validation gate.
//!
//! Status columns are stored as lowercase TEXT so the catalogue service and
//! admin exports can read them without knowing about this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payment progress as seen from a [`Registration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// Whether the user holds a seat.
///
/// `Confirmed` is only ever written together with [`PaymentStatus::Paid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// Lifecycle of a gateway order on our side. `completed` is terminal;
/// `failed` (an expired order) can still complete if the gateway captures a
/// late payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Completed,
    Failed,
}

/// Registration policy of an event or workshop. Owned by the catalogue
/// service; the registrar only reads it and bumps `registered_count`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventPolicy {
    pub id: String,
    pub name: String,
    pub is_registration_open: bool,
    pub total_slots: i64,
    pub registered_count: i64,
    /// Authoritative price in rupees.
    pub fee: f64,
    pub registration_type: String,
    pub max_team_size: Option<i64>,
}

/// The acting user, as resolved by the authentication layer in front of us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserIdentity {
    pub id: Option<String>,
}

/// Normalised output of the validation gate for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationIntent {
    pub event_id: String,
    pub price: f64,
    pub user_id: String,
    pub registration_type: String,
    pub max_team_size: i64,
}

/// A cart line as the client sent it. `price` stays untyped so that a
/// non-numeric price is reported as an invalid cart item rather than a
/// malformed request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CartItemInput {
    pub event_id: Option<String>,
    pub price: Option<serde_json::Value>,
}

/// A cart line that passed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItem {
    pub event_id: String,
    pub price: f64,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Registration {
    pub id: String,
    pub user_id: String,
    pub payment_order_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub registration_status: RegistrationStatus,
    /// Total in rupees, from server-side event fees.
    pub fee: f64,
    pub registration_type: String,
    pub team_size: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegistrationItem {
    pub event_id: String,
    pub price: f64,
}

/// Local mirror of a gateway order.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub order_id: String,
    pub payment_id: Option<String>,
    pub status: OrderStatus,
    pub signature: Option<String>,
    /// Minor units (paise).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Outcome of settling a verified payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// This call moved the payment to `completed`. `registration_id` is the
    /// registration confirmed alongside it, if one was linked.
    Settled { registration_id: Option<String> },
    /// The order had already been settled; nothing was written.
    AlreadySettled { payment_id: Option<String> },
}

/// Current unix time in seconds.
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}
