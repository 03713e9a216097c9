use super::bank_details::BankDetailsCipher;
use super::models::*;
use super::repository::PayoutRepository;
use crate::error::{AppResult, PayoutError, ProviderError};
use crate::ledger::{round_money, LedgerRepository};
use crate::providers::CardNetworkClient;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Executes a single payout end to end: provider call, ledger debit,
/// payout lifecycle.
///
/// The ledger is only debited on definitive provider confirmation, in the
/// same database transaction that marks the payout completed. An ambiguous
/// provider result (timeout, 5xx) leaves the payout `processing` so manual
/// reconciliation can finish it without ever stranding or double-moving
/// funds.
pub struct PayoutExecutor {
    ledger: Arc<LedgerRepository>,
    payouts: Arc<PayoutRepository>,
    card_network: Arc<CardNetworkClient>,
    bank_cipher: Arc<BankDetailsCipher>,
}

impl PayoutExecutor {
    pub fn new(
        ledger: Arc<LedgerRepository>,
        payouts: Arc<PayoutRepository>,
        card_network: Arc<CardNetworkClient>,
        bank_cipher: Arc<BankDetailsCipher>,
    ) -> Self {
        Self {
            ledger,
            payouts,
            card_network,
            bank_cipher,
        }
    }

    pub async fn execute(&self, store_id: Uuid, amount: Decimal, currency: &str) -> AppResult<Payout> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(PayoutError::InvalidAmount(amount).into());
        }

        let available = self.ledger.get_balance(store_id).await?.available_balance;
        if amount > available {
            return Err(PayoutError::InsufficientBalance {
                available,
                requested: amount,
            }
            .into());
        }

        let settings = self
            .payouts
            .get_settings(store_id)
            .await?
            .filter(|s| s.payouts_enabled)
            .ok_or(PayoutError::PayoutsDisabled(store_id))?;

        // Regional-wallet details must decrypt before any payout row
        // exists, so a misconfigured store fails cleanly instead of
        // accumulating orphaned processing payouts pass after pass.
        if settings.provider == PayoutProvider::RegionalWallet {
            let envelope = settings
                .bank_details_encrypted
                .as_deref()
                .ok_or(PayoutError::MissingBankDetails(store_id))?;
            // Plaintext is a statement-scoped temporary wiped on drop;
            // nothing from it reaches the logs or the database.
            self.bank_cipher.decrypt(envelope)?;
        }

        let payout = self
            .payouts
            .create_payout(store_id, amount, currency, settings.provider, PayoutStatus::Pending)
            .await?;
        self.payouts
            .transition(payout.id, PayoutStatus::Pending, PayoutStatus::Processing)
            .await?;

        match settings.provider {
            PayoutProvider::CardNetwork => self.execute_card_network(payout).await,
            PayoutProvider::RegionalWallet => self.execute_regional_wallet(payout).await,
        }
    }

    async fn execute_card_network(&self, payout: Payout) -> AppResult<Payout> {
        match self
            .card_network
            .create_transfer(payout.store_id, payout.amount, &payout.currency, payout.id)
            .await
        {
            Ok(confirmation) => {
                self.payouts
                    .set_provider_payout_id(payout.id, &confirmation.provider_payout_id)
                    .await?;
                let completed = self.settle(payout.id).await?;
                info!(
                    "✅ Payout {} completed via card network ({} {})",
                    completed.id, completed.amount, completed.currency
                );
                Ok(completed)
            }
            Err(ProviderError::TransferRejected { code, message }) => {
                let reason = format!("{code}: {message}");
                self.payouts.mark_failed(payout.id, &reason).await?;
                warn!("Payout {} rejected by card network: {}", payout.id, reason);
                self.reload(payout.id).await
            }
            Err(e @ (ProviderError::Timeout | ProviderError::Unavailable(_))) => {
                // Provider state is unknown; leave the payout processing
                // for manual reconciliation, never debit on ambiguity.
                warn!(
                    "Payout {} left processing after ambiguous provider result: {}",
                    payout.id, e
                );
                self.reload(payout.id).await
            }
        }
    }

    async fn execute_regional_wallet(&self, payout: Payout) -> AppResult<Payout> {
        info!(
            "🏦 Regional-wallet payout {} recorded for store {} ({} {}), awaiting confirmation",
            payout.id, payout.store_id, payout.amount, payout.currency
        );

        // Stays processing until an operator or cron confirms execution
        // through mark_completed.
        self.reload(payout.id).await
    }

    /// Confirm a `processing` payout: flip it to completed and post the
    /// ledger debit atomically. A second call finds the payout already
    /// completed and reports it without touching the ledger again.
    pub async fn mark_completed(&self, payout_id: Uuid) -> AppResult<Payout> {
        self.settle(payout_id).await
    }

    async fn settle(&self, payout_id: Uuid) -> AppResult<Payout> {
        let mut tx = self.ledger.begin_tx().await?;
        let payout = self.payouts.complete_in(&mut tx, payout_id).await?;
        self.ledger
            .post_payout_debit_in(&mut tx, payout.store_id, payout.amount, &payout.currency)
            .await?;
        tx.commit().await?;
        Ok(payout)
    }

    async fn reload(&self, payout_id: Uuid) -> AppResult<Payout> {
        self.payouts
            .get_payout(payout_id)
            .await?
            .ok_or_else(|| PayoutError::NotFound(payout_id).into())
    }
}
