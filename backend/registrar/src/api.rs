//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::checkout::{Checkout, CheckoutRequest};
use crate::db;
use crate::errors::RegistrarError;
use crate::models::{Registration, RegistrationItem, Settlement};
use crate::orders::OrderInitiator;
use crate::verifier::{PaymentCallback, PaymentVerifier};

pub struct ApiState {
    pub pool: SqlitePool,
    pub orders: Arc<OrderInitiator>,
    pub verifier: PaymentVerifier,
    pub checkout: Checkout,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments/orders", post(create_order))
        .route("/payments/verify", post(verify_payment))
        .route("/registrations", post(create_registration))
        .route("/registrations/:id", get(get_registration))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub amount: f64,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub already_settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    #[serde(flatten)]
    pub registration: Registration,
    pub items: Vec<RegistrationItem>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

// ─────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────

impl RegistrarError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RegistrationClosed(_) | Self::CapacityExceeded(_) => StatusCode::CONFLICT,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::SignatureMismatch => StatusCode::BAD_REQUEST,
            e if e.is_validation() => StatusCode::BAD_REQUEST,
            Self::OrderNotFound(_) | Self::RegistrationNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Persistence details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Persistence(_) | Self::Database(_) | Self::Migrate(_) => {
                "Database update failed".to_string()
            }
            Self::Gateway(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for RegistrarError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            debug!("Request rejected: {self}");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.public_message(),
                code: self.code(),
            }),
        )
            .into_response()
    }
}

fn bad_body(rejection: JsonRejection) -> RegistrarError {
    RegistrarError::InvalidInput(rejection.body_text())
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /payments/orders`
///
/// Creates a gateway order for `{amount}` rupees and returns it verbatim.
pub async fn create_order(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RegistrarError> {
    let Json(body) = body.map_err(bad_body)?;
    let order = state.orders.create_order(body.amount).await?;
    Ok((StatusCode::OK, Json(order)))
}

/// `POST /payments/verify`
///
/// Verifies the checkout callback signature and settles the order.
pub async fn verify_payment(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<PaymentCallback>, JsonRejection>,
) -> Result<impl IntoResponse, RegistrarError> {
    let Json(callback) = body.map_err(bad_body)?;
    let response = match state.verifier.verify_payment(&callback).await? {
        Settlement::Settled { registration_id } => VerifyResponse {
            success: true,
            already_settled: false,
            registration_id,
        },
        Settlement::AlreadySettled { .. } => VerifyResponse {
            success: true,
            already_settled: true,
            registration_id: None,
        },
    };
    Ok(Json(response))
}

/// `POST /registrations`
///
/// Checks out a cart: pending registration plus (for paid carts) a gateway
/// order to pay it with.
pub async fn create_registration(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<impl IntoResponse, RegistrarError> {
    let Json(request) = body.map_err(bad_body)?;
    let receipt = state.checkout.checkout(&request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// `GET /registrations/:id`
pub async fn get_registration(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, RegistrarError> {
    let registration = db::get_registration(&state.pool, &id)
        .await?
        .ok_or_else(|| RegistrarError::RegistrationNotFound(id.clone()))?;
    let items = db::get_registration_items(&state.pool, &id).await?;
    Ok(Json(RegistrationResponse {
        registration,
        items,
    }))
}

// ─────────────────────────────────────────────────────────
// Router tests
// ─────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::db::fixtures::*;
    use crate::orders::fakes::RecordingGateway;
    use crate::signature::expected_signature;

    const SECRET: &str = "rzp_test_secret";

    async fn app_with(gateway: RecordingGateway) -> (SqlitePool, Router) {
        let pool = memory_pool().await;
        put_event(&pool, &event("robowar", 500.0, 20)).await;
        let orders = Arc::new(OrderInitiator::new(
            pool.clone(),
            Arc::new(gateway),
            "INR".to_string(),
        ));
        let state = Arc::new(ApiState {
            pool: pool.clone(),
            orders: orders.clone(),
            verifier: PaymentVerifier::new(pool.clone(), SECRET.to_string()),
            checkout: Checkout::new(pool.clone(), orders),
        });
        (pool, router(state))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(b) => request.body(Body::from(b.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_pool, app) = app_with(RecordingGateway::default()).await;
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn create_order_returns_gateway_order() {
        let (_pool, app) = app_with(RecordingGateway::default()).await;
        let (status, body) =
            call(&app, "POST", "/payments/orders", Some(json!({ "amount": 500 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], "order_1");
        assert_eq!(body["amount"], 50_000);
        assert_eq!(body["currency"], "INR");
        assert_eq!(body["status"], "created");
    }

    #[tokio::test]
    async fn gateway_failure_is_500_with_message() {
        let (_pool, app) = app_with(RecordingGateway::failing("Authentication failed")).await;
        let (status, body) =
            call(&app, "POST", "/payments/orders", Some(json!({ "amount": 500 }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Authentication failed");
    }

    #[tokio::test]
    async fn bad_amount_is_400() {
        let (_pool, app) = app_with(RecordingGateway::default()).await;
        let (status, body) =
            call(&app, "POST", "/payments/orders", Some(json!({ "amount": -3 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_amount");

        let (status, _) =
            call(&app, "POST", "/payments/orders", Some(json!({ "amount": "lots" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_then_verify_over_http() {
        let (_pool, app) = app_with(RecordingGateway::default()).await;

        let (status, receipt) = call(
            &app,
            "POST",
            "/registrations",
            Some(json!({
                "user": { "id": "kp_7" },
                "items": [{ "event_id": "robowar", "price": 500 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let order_id = receipt["order"]["id"].as_str().unwrap().to_string();
        let registration_id = receipt["registration"]["id"].as_str().unwrap().to_string();
        assert_eq!(receipt["registration"]["registration_status"], "pending");

        let (status, body) = call(
            &app,
            "POST",
            "/payments/verify",
            Some(json!({
                "razorpay_order_id": order_id,
                "razorpay_payment_id": "pay_123",
                "razorpay_signature": "0".repeat(64),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid signature");

        let signature = expected_signature(SECRET.as_bytes(), &order_id, "pay_123");
        let callback = json!({
            "razorpay_order_id": order_id,
            "razorpay_payment_id": "pay_123",
            "razorpay_signature": signature,
        });
        let (status, body) = call(&app, "POST", "/payments/verify", Some(callback.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["already_settled"], false);
        assert_eq!(body["registration_id"], registration_id.as_str());

        let (status, body) = call(&app, "POST", "/payments/verify", Some(callback)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["already_settled"], true);

        let (status, body) =
            call(&app, "GET", &format!("/registrations/{registration_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment_status"], "paid");
        assert_eq!(body["registration_status"], "confirmed");
        assert_eq!(body["items"][0]["event_id"], "robowar");
    }

    #[tokio::test]
    async fn verification_persistence_failure_is_500() {
        let (pool, app) = app_with(RecordingGateway::default()).await;
        pool.close().await;

        let signature = expected_signature(SECRET.as_bytes(), "order_1", "pay_1");
        let (status, body) = call(
            &app,
            "POST",
            "/payments/verify",
            Some(json!({
                "razorpay_order_id": "order_1",
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": signature,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database update failed");
    }

    #[tokio::test]
    async fn validation_errors_map_to_client_statuses() {
        let (pool, app) = app_with(RecordingGateway::default()).await;
        let mut full = event("robowar", 500.0, 20);
        full.registered_count = 20;
        put_event(&pool, &full).await;

        let (status, body) = call(
            &app,
            "POST",
            "/registrations",
            Some(json!({
                "user": { "id": "kp_7" },
                "items": [{ "event_id": "robowar", "price": 500 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "capacity_exceeded");

        let (status, body) = call(
            &app,
            "POST",
            "/registrations",
            Some(json!({
                "user": {},
                "items": [{ "event_id": "robowar", "price": 500 }]
            })),
        )
        .await;
        // Capacity is checked before identity.
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "capacity_exceeded");

        put_event(&pool, &event("robowar", 500.0, 20)).await;
        let (status, body) = call(
            &app,
            "POST",
            "/registrations",
            Some(json!({
                "user": {},
                "items": [{ "event_id": "robowar", "price": 500 }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthenticated");

        let (status, _) = call(&app, "GET", "/registrations/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
