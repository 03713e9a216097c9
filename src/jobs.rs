use crate::api::AppState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// In-process counterparts of the signed cron endpoints. Both loops and
/// the endpoints funnel into the same idempotent operations, so running
/// them side by side is harmless.
pub fn spawn_background_jobs(state: Arc<AppState>) {
    let promotion_state = state.clone();
    let promotion_interval = state.config.hold_promotion_interval_secs;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(promotion_interval)).await;

            match promotion_state.ledger.promote_matured_holds(Utc::now()).await {
                Ok(summary) if !summary.errors.is_empty() => {
                    error!(
                        "Hold promotion finished with {} errors ({} promoted)",
                        summary.errors.len(),
                        summary.promoted
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Hold promotion pass failed: {:?}", e),
            }
        }
    });
    info!("✅ Hold promotion task started (every {}s)", promotion_interval);

    let payout_interval = state.config.payout_pass_interval_secs;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(payout_interval)).await;

            match state.scheduler.run_scheduled_payout_pass(Utc::now()).await {
                Ok(summary) if !summary.errors.is_empty() => {
                    error!(
                        "Payout pass finished with {} errors ({} processed, {} skipped)",
                        summary.errors.len(),
                        summary.processed,
                        summary.skipped
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Payout pass failed: {:?}", e),
            }
        }
    });
    info!("✅ Scheduled payout task started (every {}s)", payout_interval);
}
