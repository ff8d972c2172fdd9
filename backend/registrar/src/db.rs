//! Database layer: migrations, registration/payment writes, and the
//! queries behind the reconciler.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::errors::{RegistrarError, Result};
use crate::gateway::GatewayOrder;
use crate::models::{
    now_unix, EventPolicy, Payment, Registration, RegistrationItem, Settlement,
};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };

    // Make sure the file is created if it doesn't exist yet.
    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // Every connection to an in-memory database sees its own empty database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Event policies
// ─────────────────────────────────────────────────────────

pub async fn get_event(pool: &SqlitePool, event_id: &str) -> Result<Option<EventPolicy>> {
    let row = sqlx::query_as::<_, EventPolicy>(
        r#"
        SELECT id, name, is_registration_open, total_slots, registered_count,
               fee, registration_type, max_team_size
        FROM   events
        WHERE  id = ?1
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Registration writes
// ─────────────────────────────────────────────────────────

/// Fields of a registration at creation time. Status columns start at
/// `pending/pending`.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub id: String,
    pub user_id: String,
    pub fee: f64,
    pub registration_type: String,
    pub team_size: i64,
    pub items: Vec<RegistrationItem>,
}

/// Insert a pending registration together with its items.
pub async fn insert_registration(pool: &SqlitePool, new: &NewRegistration) -> Result<()> {
    let now = now_unix();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO registrations
            (id, user_id, payment_status, registration_status, fee,
             registration_type, team_size, created_at, updated_at)
        VALUES (?1, ?2, 'pending', 'pending', ?3, ?4, ?5, ?6, ?6)
        "#,
    )
    .bind(&new.id)
    .bind(&new.user_id)
    .bind(new.fee)
    .bind(&new.registration_type)
    .bind(new.team_size)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for item in &new.items {
        sqlx::query(
            "INSERT INTO registration_items (registration_id, event_id, price) VALUES (?1, ?2, ?3)",
        )
        .bind(&new.id)
        .bind(&item.event_id)
        .bind(item.price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Attach a gateway order to a pending registration.
pub async fn link_order(pool: &SqlitePool, registration_id: &str, order_id: &str) -> Result<()> {
    let rows = sqlx::query(
        r#"
        UPDATE registrations
        SET    payment_order_id = ?1, updated_at = ?2
        WHERE  id = ?3 AND registration_status = 'pending'
        "#,
    )
    .bind(order_id)
    .bind(now_unix())
    .bind(registration_id)
    .execute(pool)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(RegistrarError::RegistrationNotFound(
            registration_id.to_string(),
        ));
    }
    Ok(())
}

/// Confirm a registration that owes nothing (every selected event is free).
pub async fn confirm_free_registration(pool: &SqlitePool, registration_id: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    let rows = sqlx::query(
        r#"
        UPDATE registrations
        SET    payment_status = 'paid', registration_status = 'confirmed', updated_at = ?1
        WHERE  id = ?2 AND registration_status = 'pending' AND fee = 0
        "#,
    )
    .bind(now_unix())
    .bind(registration_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if rows == 0 {
        return Err(RegistrarError::RegistrationNotFound(
            registration_id.to_string(),
        ));
    }
    bump_registered_counts(&mut tx, registration_id).await?;
    tx.commit().await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Payment writes
// ─────────────────────────────────────────────────────────

/// Record a freshly created gateway order in `created` state.
pub async fn insert_payment(pool: &SqlitePool, order: &GatewayOrder, receipt: &str) -> Result<()> {
    let now = now_unix();
    sqlx::query(
        r#"
        INSERT INTO payments (order_id, status, amount, currency, receipt, created_at, updated_at)
        VALUES (?1, 'created', ?2, ?3, ?4, ?5, ?5)
        "#,
    )
    .bind(&order.id)
    .bind(order.amount)
    .bind(&order.currency)
    .bind(receipt)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Settle a verified payment: complete the payment and confirm its
/// registration in a single transaction.
///
/// The payment update is a check-and-set on `status <> 'completed'`, so only
/// the first of several concurrent callbacks for the same order writes
/// anything; the others get [`Settlement::AlreadySettled`] and the stored
/// `payment_id` is left untouched.
///
/// A payment captured after its registration expired still settles: the
/// money has moved, so the cancelled registration is confirmed again.
pub async fn settle_order(
    pool: &SqlitePool,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<Settlement> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE payments
        SET    payment_id = ?1, status = 'completed', signature = ?2, updated_at = ?3
        WHERE  order_id = ?4 AND status <> 'completed'
        "#,
    )
    .bind(payment_id)
    .bind(signature)
    .bind(now_unix())
    .bind(order_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT payment_id FROM payments WHERE order_id = ?1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.rollback().await?;
        return match existing {
            None => Err(RegistrarError::OrderNotFound(order_id.to_string())),
            Some((payment_id,)) => Ok(Settlement::AlreadySettled { payment_id }),
        };
    }

    let registration_id = confirm_for_order(&mut tx, order_id).await?;
    tx.commit().await?;

    Ok(Settlement::Settled { registration_id })
}

/// Move the unconfirmed registration linked to `order_id` to
/// `paid/confirmed` and count it against each selected event. Returns the
/// registration id, or `None` when no unconfirmed registration references
/// the order.
async fn confirm_for_order(
    tx: &mut Transaction<'_, Sqlite>,
    order_id: &str,
) -> Result<Option<String>> {
    let registration: Option<(String,)> = sqlx::query_as(
        r#"
        UPDATE registrations
        SET    payment_status = 'paid', registration_status = 'confirmed', updated_at = ?1
        WHERE  payment_order_id = ?2 AND registration_status <> 'confirmed'
        RETURNING id
        "#,
    )
    .bind(now_unix())
    .bind(order_id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some((registration_id,)) = registration else {
        return Ok(None);
    };

    bump_registered_counts(tx, &registration_id).await?;
    Ok(Some(registration_id))
}

async fn bump_registered_counts(
    tx: &mut Transaction<'_, Sqlite>,
    registration_id: &str,
) -> Result<()> {
    let bumped = sqlx::query(
        r#"
        UPDATE events
        SET    registered_count = registered_count + 1
        WHERE  id IN (SELECT event_id FROM registration_items WHERE registration_id = ?1)
        "#,
    )
    .bind(registration_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    debug!("Registration {registration_id} counted against {bumped} events");
    Ok(())
}

// ─────────────────────────────────────────────────────────
// Reconciliation
// ─────────────────────────────────────────────────────────

/// Order ids whose payment completed while the linked registration is still
/// pending.
pub async fn find_unconfirmed_completed_orders(pool: &SqlitePool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT p.order_id
        FROM   payments p
        JOIN   registrations r ON r.payment_order_id = p.order_id
        WHERE  p.status = 'completed' AND r.registration_status = 'pending'
        ORDER  BY p.updated_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Confirm the registration of an already completed payment.
pub async fn repair_order(pool: &SqlitePool, order_id: &str) -> Result<Option<String>> {
    let mut tx = pool.begin().await?;
    let registration_id = confirm_for_order(&mut tx, order_id).await?;
    tx.commit().await?;
    Ok(registration_id)
}

/// Cancel registrations that have been pending since before `cutoff` (unix
/// seconds) and fail their still-open payments. Returns the number of
/// registrations cancelled.
///
/// Registrations whose payment already completed are left for
/// [`repair_order`].
pub async fn expire_pending(pool: &SqlitePool, cutoff: i64) -> Result<u64> {
    let now = now_unix();
    let mut tx = pool.begin().await?;

    let stale: Vec<(String, Option<String>)> = sqlx::query_as(
        r#"
        SELECT r.id, r.payment_order_id
        FROM   registrations r
        LEFT   JOIN payments p ON p.order_id = r.payment_order_id
        WHERE  r.registration_status = 'pending'
          AND  r.created_at < ?1
          AND  (p.status IS NULL OR p.status = 'created')
        "#,
    )
    .bind(cutoff)
    .fetch_all(&mut *tx)
    .await?;

    for (registration_id, order_id) in &stale {
        sqlx::query(
            r#"
            UPDATE registrations
            SET    payment_status = 'failed', registration_status = 'cancelled', updated_at = ?1
            WHERE  id = ?2 AND registration_status = 'pending'
            "#,
        )
        .bind(now)
        .bind(registration_id)
        .execute(&mut *tx)
        .await?;

        if let Some(order_id) = order_id {
            sqlx::query(
                "UPDATE payments SET status = 'failed', updated_at = ?1 WHERE order_id = ?2 AND status = 'created'",
            )
            .bind(now)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(stale.len() as u64)
}

// ─────────────────────────────────────────────────────────
// Reads
// ─────────────────────────────────────────────────────────

pub async fn get_registration(pool: &SqlitePool, id: &str) -> Result<Option<Registration>> {
    let row = sqlx::query_as::<_, Registration>(
        r#"
        SELECT id, user_id, payment_order_id, payment_status, registration_status,
               fee, registration_type, team_size, created_at, updated_at
        FROM   registrations
        WHERE  id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_registration_items(
    pool: &SqlitePool,
    registration_id: &str,
) -> Result<Vec<RegistrationItem>> {
    let rows = sqlx::query_as::<_, RegistrationItem>(
        r#"
        SELECT event_id, price
        FROM   registration_items
        WHERE  registration_id = ?1
        ORDER  BY event_id ASC
        "#,
    )
    .bind(registration_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get_payment(pool: &SqlitePool, order_id: &str) -> Result<Option<Payment>> {
    let row = sqlx::query_as::<_, Payment>(
        r#"
        SELECT order_id, payment_id, status, signature, amount, currency, receipt,
               created_at, updated_at
        FROM   payments
        WHERE  order_id = ?1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

// ─────────────────────────────────────────────────────────
// Test fixtures
// ─────────────────────────────────────────────────────────
