//! Long-running background task that repairs half-settled orders and
//! expires abandoned registrations.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db;
use crate::models::now_unix;

pub struct ReconcilerState {
    pub pool: SqlitePool,
    pub config: Config,
}

/// What a single pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub repaired: usize,
    pub expired: u64,
}

/// Run the reconciler loop until `shutdown` is cancelled.
pub async fn run(state: Arc<ReconcilerState>, shutdown: CancellationToken) {
    info!(
        "Reconciler starting: interval {}s, pending expiry {}s",
        state.config.reconcile_interval_secs, state.config.pending_expiry_secs
    );

    let interval = Duration::from_secs(state.config.reconcile_interval_secs.max(1));

    loop {
        match reconcile_once(&state.pool, state.config.pending_expiry_secs).await {
            Ok(report) if report != PassReport::default() => {
                info!(
                    "Reconciler pass: {} registrations repaired, {} expired",
                    report.repaired, report.expired
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!("Reconciler pass error: {e}");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Reconciler stopping");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Perform a single reconciliation pass.
///
/// Orders that failed to repair are logged and retried on the next pass.
pub async fn reconcile_once(
    pool: &SqlitePool,
    pending_expiry_secs: u64,
) -> crate::errors::Result<PassReport> {
    let mut report = PassReport::default();

    for order_id in db::find_unconfirmed_completed_orders(pool).await? {
        match db::repair_order(pool, &order_id).await {
            Ok(Some(registration_id)) => {
                warn!("Confirmed registration {registration_id} for completed order {order_id}");
                report.repaired += 1;
            }
            Ok(None) => {}
            Err(e) => error!("Could not repair order {order_id}: {e}"),
        }
    }

    if pending_expiry_secs > 0 {
        let cutoff = now_unix().saturating_sub(i64::try_from(pending_expiry_secs).unwrap_or(i64::MAX));
        report.expired = db::expire_pending(pool, cutoff).await?;
    }

    Ok(report)
}
