use super::fees::{percentage_fee, proportional_fee_reversal};
use crate::error::{AppError, AppResult, LedgerError};
use crate::ledger::{LedgerRepository, TransactionType};
use crate::providers::CardNetworkClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Applies order-management webhook events to the ledger.
///
/// Each handler is idempotent under webhook redelivery: payment capture is
/// deduplicated by the `(order_id, order_payment)` uniqueness constraint,
/// refunds are bounded by the cumulative-refund guard, and cancellation of
/// a fully-refunded order is a no-op.
pub struct ReconciliationService {
    ledger: Arc<LedgerRepository>,
    card_network: Arc<CardNetworkClient>,
    platform_fee_percent: Decimal,
    provider_fee_percent: Decimal,
    hold_period_days: i64,
}

impl ReconciliationService {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        card_network: Arc<CardNetworkClient>,
        platform_fee_percent: Decimal,
        provider_fee_percent: Decimal,
        hold_period_days: i64,
    ) -> Self {
        Self {
            ledger,
            card_network,
            platform_fee_percent,
            provider_fee_percent,
            hold_period_days,
        }
    }

    /// Payment captured: credit the held order payment and debit both fees
    /// in one atomic posting. A redelivered capture event is absorbed
    /// silently.
    pub async fn on_payment_captured(
        &self,
        order_id: Uuid,
        store_id: Uuid,
        amount: Decimal,
        currency: &str,
        payment_provider: &str,
    ) -> AppResult<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount).into());
        }

        let platform_fee = percentage_fee(amount, self.platform_fee_percent);
        let provider_fee = percentage_fee(amount, self.provider_fee_percent);

        let mut tx = self.ledger.begin_tx().await?;

        let posted = self
            .ledger
            .post_transaction_in(
                &mut tx,
                store_id,
                TransactionType::OrderPayment,
                amount,
                currency,
                self.hold_period_days,
                Some(order_id),
            )
            .await;

        if let Err(e) = posted {
            // duplicate delivery of the same capture event
            if matches!(&e, AppError::Ledger(LedgerError::DuplicateEvent { .. })) {
                info!("Capture for order {} already posted, ignoring redelivery", order_id);
                return Ok(());
            }
            return Err(e);
        }

        self.ledger
            .post_transaction_in(
                &mut tx,
                store_id,
                TransactionType::PlatformFee,
                -platform_fee,
                currency,
                0,
                Some(order_id),
            )
            .await?;
        self.ledger
            .post_transaction_in(
                &mut tx,
                store_id,
                TransactionType::ProviderFee,
                -provider_fee,
                currency,
                0,
                Some(order_id),
            )
            .await?;

        tx.commit().await?;

        info!(
            "💰 Captured {} {} for order {} via {} (fees {} + {})",
            amount, currency, order_id, payment_provider, platform_fee, provider_fee
        );
        Ok(())
    }

    /// Refund: debit the refunded amount and credit back the proportional
    /// share of the platform fee. Cumulative refunds may never exceed the
    /// original order payment.
    pub async fn on_refund(
        &self,
        order_id: Uuid,
        store_id: Uuid,
        refund_amount: Decimal,
        currency: &str,
    ) -> AppResult<()> {
        if refund_amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(refund_amount).into());
        }

        // Guard reads happen under the store's balance-row lock, so two
        // concurrent deliveries of the same refund serialize and the
        // second one sees the first one's posting.
        let mut tx = self.ledger.begin_tx().await?;
        self.ledger
            .lock_balance_row(&mut tx, store_id, currency)
            .await?;

        let original = self
            .ledger
            .get_order_payment_in(&mut tx, order_id)
            .await?
            .ok_or(LedgerError::PaymentNotCaptured(order_id))?;

        let already_refunded = self.ledger.refunded_total_in(&mut tx, order_id).await?;
        let remaining = original.amount - already_refunded;
        if refund_amount > remaining {
            return Err(LedgerError::OverRefund {
                order_id,
                requested: refund_amount,
                remaining,
            }
            .into());
        }

        let original_fee = self.ledger.platform_fee_for_order_in(&mut tx, order_id).await?;
        let fee_reversal = proportional_fee_reversal(original_fee, refund_amount, original.amount);

        self.ledger
            .post_transaction_in(
                &mut tx,
                store_id,
                TransactionType::Refund,
                -refund_amount,
                currency,
                0,
                Some(order_id),
            )
            .await?;
        if fee_reversal > Decimal::ZERO {
            self.ledger
                .post_transaction_in(
                    &mut tx,
                    store_id,
                    TransactionType::Adjustment,
                    fee_reversal,
                    currency,
                    0,
                    Some(order_id),
                )
                .await?;
        }
        tx.commit().await?;

        info!(
            "↩️ Refunded {} {} for order {} (fee reversal {})",
            refund_amount, currency, order_id, fee_reversal
        );
        Ok(())
    }

    /// Cancellation: an uncaptured order just has its authorization
    /// voided; a captured one goes through the refund path for whatever
    /// has not been refunded yet.
    pub async fn on_cancellation(&self, order_id: Uuid, store_id: Uuid) -> AppResult<()> {
        let Some(original) = self.ledger.get_order_payment(order_id).await? else {
            self.card_network.void_authorization(order_id).await?;
            return Ok(());
        };

        let remaining = original.amount - self.ledger.refunded_total(order_id).await?;
        if remaining <= Decimal::ZERO {
            info!("Order {} already fully refunded, cancellation is a no-op", order_id);
            return Ok(());
        }

        self.on_refund(order_id, store_id, remaining, &original.currency)
            .await
    }

    /// Dispute: debit the disputed amount immediately. Fees stay in place
    /// until the dispute resolves.
    pub async fn on_dispute(
        &self,
        order_id: Uuid,
        store_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<()> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount).into());
        }

        self.ledger
            .post_transaction(
                store_id,
                TransactionType::Dispute,
                -amount,
                currency,
                0,
                Some(order_id),
            )
            .await?;

        warn!("⚠️ Dispute of {} {} posted against order {}", amount, currency, order_id);
        Ok(())
    }
}
