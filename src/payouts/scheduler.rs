use super::executor::PayoutExecutor;
use super::models::*;
use super::repository::PayoutRepository;
use super::schedule::calculate_next_payout_date;
use crate::error::{AppError, AppResult, PayoutError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Drives the automatic payout pass over every due store.
///
/// Stores are isolated from each other: one slow or failing store is
/// bounded by a per-store timeout, recorded in the pass summary, and never
/// blocks the rest of the batch.
pub struct PayoutScheduler {
    payouts: Arc<PayoutRepository>,
    executor: Arc<PayoutExecutor>,
    store_timeout: Duration,
}

impl PayoutScheduler {
    pub fn new(
        payouts: Arc<PayoutRepository>,
        executor: Arc<PayoutExecutor>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            payouts,
            executor,
            store_timeout,
        }
    }

    pub async fn run_scheduled_payout_pass(&self, now: DateTime<Utc>) -> AppResult<PassSummary> {
        let eligible = self.payouts.find_eligible_stores(now).await?;
        if eligible.is_empty() {
            return Ok(PassSummary::default());
        }

        info!("⏱️ Payout pass starting: {} eligible stores", eligible.len());
        let mut summary = PassSummary::default();

        for store in eligible {
            let run = tokio::time::timeout(
                self.store_timeout,
                self.executor
                    .execute(store.store_id, store.available_balance, &store.currency),
            )
            .await;

            match run {
                Ok(Ok(payout)) if payout.status == PayoutStatus::Failed => {
                    // next_payout_at stays put, so the store retries on the
                    // next pass once the provider problem clears
                    warn!(
                        "Payout for store {} failed: {}",
                        store.store_id,
                        payout.failure_reason.as_deref().unwrap_or("unknown")
                    );
                    summary.errors.push(PassError {
                        store_id: store.store_id,
                        message: payout
                            .failure_reason
                            .unwrap_or_else(|| "provider rejected transfer".to_string()),
                    });
                }
                Ok(Ok(payout)) => {
                    summary.processed += 1;
                    self.reschedule(&store, now).await;
                    info!(
                        "Payout {} for store {} is {}",
                        payout.id, store.store_id, payout.status
                    );
                }
                // Eligible when queried but no longer payable: no payout
                // row was created, so this is a skip, not an error.
                Ok(Err(AppError::Payout(
                    e @ (PayoutError::PayoutsDisabled(_) | PayoutError::MissingBankDetails(_)),
                ))) => {
                    warn!("Store {} skipped: {}", store.store_id, e);
                    summary.skipped += 1;
                }
                Ok(Err(e)) => {
                    error!("Payout for store {} errored: {:?}", store.store_id, e);
                    summary.errors.push(PassError {
                        store_id: store.store_id,
                        message: e.to_string(),
                    });
                }
                Err(_) => {
                    error!(
                        "Payout for store {} timed out after {:?}",
                        store.store_id, self.store_timeout
                    );
                    summary.errors.push(PassError {
                        store_id: store.store_id,
                        message: format!("timed out after {:?}", self.store_timeout),
                    });
                }
            }
        }

        info!(
            "⏱️ Payout pass done: {} processed, {} skipped, {} errors",
            summary.processed,
            summary.skipped,
            summary.errors.len()
        );
        Ok(summary)
    }

    /// Advance `next_payout_at` after a successful execution. A scheduling
    /// error is logged but never fails the pass; the store simply stays
    /// due and surfaces again next time.
    async fn reschedule(&self, store: &EligibleStore, now: DateTime<Utc>) {
        let Some(schedule) = store.schedule else {
            warn!(
                "Store {} is automatic but has no schedule; leaving next_payout_at",
                store.store_id
            );
            return;
        };

        let next = calculate_next_payout_date(
            schedule,
            store.payout_day_of_week,
            store.payout_day_of_month,
            now,
            store.next_payout_at,
        );

        match next {
            Ok(next) => {
                if let Err(e) = self.payouts.set_next_payout_at(store.store_id, next).await {
                    error!(
                        "Failed to persist next payout time for store {}: {:?}",
                        store.store_id, e
                    );
                }
            }
            Err(e) => {
                error!(
                    "Could not compute next payout time for store {}: {}",
                    store.store_id, e
                );
            }
        }
    }
}
