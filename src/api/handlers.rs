use super::auth::{require_cron_secret, verify_webhook_signature};
use super::models::*;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::ledger::{LedgerEntry, LedgerRepository, PromotionSummary, StoreBalance};
use crate::payouts::bank_details::BankDetailsCipher;
use crate::payouts::executor::PayoutExecutor;
use crate::payouts::schedule::calculate_next_payout_date;
use crate::payouts::scheduler::PayoutScheduler;
use crate::payouts::{
    PassSummary, Payout, PayoutMethod, PayoutRepository, SettingsUpdate,
};
use crate::reconciliation::ReconciliationService;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

pub struct AppState {
    pub config: Config,
    pub ledger: Arc<LedgerRepository>,
    pub payouts: Arc<PayoutRepository>,
    pub executor: Arc<PayoutExecutor>,
    pub scheduler: Arc<PayoutScheduler>,
    pub reconciliation: Arc<ReconciliationService>,
    pub bank_cipher: Arc<BankDetailsCipher>,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<StoreBalance>> {
    Ok(Json(state.ledger.get_balance(store_id).await?))
}

pub async fn get_activity(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
) -> AppResult<Json<Vec<LedgerEntry>>> {
    let feed = state
        .ledger
        .get_activity_feed(
            store_id,
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(25),
        )
        .await?;
    Ok(Json(feed))
}

pub async fn get_payout_settings(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<PayoutSettingsResponse>> {
    let settings = state
        .payouts
        .get_settings(store_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no payout settings for store {store_id}")))?;
    Ok(Json(settings.into()))
}

pub async fn update_payout_settings(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
    Json(request): Json<UpdatePayoutSettingsRequest>,
) -> AppResult<Json<PayoutSettingsResponse>> {
    request
        .validate()
        .map_err(|e| AppError::InvalidInput(e.to_string()))?;

    // automatic stores need a computable schedule before we accept it
    let next_payout_at = match (request.method, request.schedule) {
        (PayoutMethod::Automatic, Some(schedule)) => Some(calculate_next_payout_date(
            schedule,
            request.payout_day_of_week,
            request.payout_day_of_month,
            Utc::now(),
            None,
        )?),
        (PayoutMethod::Automatic, None) => {
            return Err(AppError::InvalidInput(
                "automatic payouts require a schedule".to_string(),
            ))
        }
        (PayoutMethod::Manual, _) => None,
    };

    let bank_details_encrypted = match &request.bank_details {
        Some(details) => Some(state.bank_cipher.encrypt(details)?),
        None => None,
    };

    let settings = state
        .payouts
        .upsert_settings(
            store_id,
            SettingsUpdate {
                method: request.method,
                schedule: request.schedule,
                payout_day_of_week: request.payout_day_of_week,
                payout_day_of_month: request.payout_day_of_month,
                minimum_amount: request
                    .minimum_amount
                    .unwrap_or(state.config.default_minimum_payout),
                next_payout_at,
                provider: request.provider,
                payouts_enabled: request.payouts_enabled,
                bank_details_encrypted,
            },
        )
        .await?;

    info!("⚙️ Payout settings updated for store {}", store_id);
    Ok(Json(settings.into()))
}

pub async fn list_payouts(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
) -> AppResult<Json<Vec<Payout>>> {
    Ok(Json(state.payouts.list_payouts(store_id, 50).await?))
}

/// Manual payout. Deliberately skips the minimum-amount check; the amount
/// still has to be positive and covered by provider confirmation before
/// any ledger debit.
pub async fn create_manual_payout(
    State(state): State<Arc<AppState>>,
    Path(store_id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<ManualPayoutRequest>,
) -> AppResult<Json<Payout>> {
    require_cron_secret(&headers, &state.config.cron_secret)?;

    let balance = state.ledger.get_balance(store_id).await?;
    let payout = state
        .executor
        .execute(store_id, request.amount, &balance.currency)
        .await?;
    Ok(Json(payout))
}

pub async fn orders_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    verify_webhook_signature(&headers, &state.config.webhook_secret, &body)?;

    let event: OrderEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("unparseable order event: {e}")))?;

    match event {
        OrderEvent::PaymentCaptured {
            order_id,
            store_id,
            amount,
            currency,
            provider,
        } => {
            state
                .reconciliation
                .on_payment_captured(order_id, store_id, amount, &currency, &provider)
                .await?
        }
        OrderEvent::RefundIssued {
            order_id,
            store_id,
            amount,
            currency,
        } => {
            state
                .reconciliation
                .on_refund(order_id, store_id, amount, &currency)
                .await?
        }
        OrderEvent::OrderCancelled { order_id, store_id } => {
            state
                .reconciliation
                .on_cancellation(order_id, store_id)
                .await?
        }
        OrderEvent::DisputeOpened {
            order_id,
            store_id,
            amount,
            currency,
        } => {
            state
                .reconciliation
                .on_dispute(order_id, store_id, amount, &currency)
                .await?
        }
    }

    Ok(Json(WebhookAck { received: true }))
}

pub async fn cron_promote_holds(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<PromotionSummary>> {
    require_cron_secret(&headers, &state.config.cron_secret)?;
    Ok(Json(state.ledger.promote_matured_holds(Utc::now()).await?))
}

pub async fn cron_run_payouts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> AppResult<Json<PassSummary>> {
    require_cron_secret(&headers, &state.config.cron_secret)?;
    Ok(Json(
        state.scheduler.run_scheduled_payout_pass(Utc::now()).await?,
    ))
}

pub async fn admin_complete_payout(
    State(state): State<Arc<AppState>>,
    Path(payout_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Payout>> {
    require_cron_secret(&headers, &state.config.cron_secret)?;
    Ok(Json(state.executor.mark_completed(payout_id).await?))
}
