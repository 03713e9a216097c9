use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;
use uuid::Uuid;

/// Round a money amount to 2 decimal places, half-up.
///
/// Every amount that reaches the ledger goes through this, so balances and
/// transaction rows stay at fixed 2-decimal precision.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// One variant per money event the ledger records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    OrderPayment,
    PlatformFee,
    ProviderFee,
    ShippingLabel,
    Refund,
    Dispute,
    Payout,
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::OrderPayment => "order_payment",
            TransactionType::PlatformFee => "platform_fee",
            TransactionType::ProviderFee => "provider_fee",
            TransactionType::ShippingLabel => "shipping_label",
            TransactionType::Refund => "refund",
            TransactionType::Dispute => "dispute",
            TransactionType::Payout => "payout",
            TransactionType::Adjustment => "adjustment",
        }
    }

    /// Only order-payment credits sit behind the chargeback-risk hold.
    /// Fees and shipping labels are deducted at sale confirmation; refunds
    /// and disputes hit the available balance immediately.
    pub fn is_holdable(&self) -> bool {
        matches!(self, TransactionType::OrderPayment)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "transaction_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Available,
    PaidOut,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Available => "available",
            TransactionStatus::PaidOut => "paid_out",
        }
    }
}

/// Per-store balance row. Mutated only through ledger operations, in the
/// same database transaction as the balance_transactions insert/update.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoreBalance {
    pub store_id: Uuid,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl StoreBalance {
    /// Zero-valued balance for a store that has never transacted.
    pub fn zero(store_id: Uuid, currency: &str) -> Self {
        Self {
            store_id,
            available_balance: Decimal::ZERO,
            pending_balance: Decimal::ZERO,
            currency: currency.to_string(),
            updated_at: Utc::now(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.available_balance + self.pending_balance
    }
}

/// Append-only ledger row. Immutable once created except for the status
/// transitions pending -> available (hold promotion) and
/// available -> paid_out (payout execution).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BalanceTransaction {
    pub id: Uuid,
    pub store_id: Uuid,
    pub tx_type: TransactionType,
    /// Signed: credits positive, debits negative.
    pub amount: Decimal,
    pub currency: String,
    pub status: TransactionStatus,
    pub available_at: Option<DateTime<Utc>>,
    /// Non-owning back-reference to the order-management collaborator.
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Activity-feed entry: a transaction plus the ledger balance after it.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub transaction: BalanceTransaction,
    pub running_balance: Decimal,
}

/// Walk the ledger backward from `balance_after_newest` (the combined
/// balance as of the newest transaction in `transactions`) and attach a
/// running balance to each entry.
///
/// `transactions` must be ordered newest-first; the result reproduces the
/// cumulative totals `get_balance` reports.
pub fn with_running_balances(
    balance_after_newest: Decimal,
    transactions: Vec<BalanceTransaction>,
) -> Vec<LedgerEntry> {
    let mut running = balance_after_newest;
    let mut entries = Vec::with_capacity(transactions.len());
    for tx in transactions {
        let amount = tx.amount;
        entries.push(LedgerEntry {
            transaction: tx,
            running_balance: running,
        });
        running -= amount;
    }
    entries
}

/// Result of one matured-holds promotion pass.
#[derive(Debug, Default, Serialize)]
pub struct PromotionSummary {
    pub promoted: u32,
    pub errors: Vec<PromotionError>,
}

#[derive(Debug, Serialize)]
pub struct PromotionError {
    pub transaction_id: Uuid,
    pub store_id: Uuid,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(amount: Decimal) -> BalanceTransaction {
        BalanceTransaction {
            id: Uuid::new_v4(),
            store_id: Uuid::new_v4(),
            tx_type: TransactionType::OrderPayment,
            amount,
            currency: "USD".to_string(),
            status: TransactionStatus::Available,
            available_at: None,
            order_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn round_money_is_half_up_at_two_decimals() {
        assert_eq!(round_money(dec!(2.005)), dec!(2.01));
        assert_eq!(round_money(dec!(2.004)), dec!(2.00));
        assert_eq!(round_money(dec!(-2.005)), dec!(-2.01));
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
        assert_eq!(round_money(dec!(100)), dec!(100));
    }

    #[test]
    fn only_order_payments_are_holdable() {
        assert!(TransactionType::OrderPayment.is_holdable());
        assert!(!TransactionType::PlatformFee.is_holdable());
        assert!(!TransactionType::Refund.is_holdable());
        assert!(!TransactionType::Dispute.is_holdable());
        assert!(!TransactionType::Payout.is_holdable());
    }

    #[test]
    fn running_balances_walk_backward_from_current() {
        // Newest first: -5 fee, +100 payment. Current combined balance 95.
        let txs = vec![tx(dec!(-5.00)), tx(dec!(100.00))];
        let entries = with_running_balances(dec!(95.00), txs);

        assert_eq!(entries[0].running_balance, dec!(95.00));
        assert_eq!(entries[1].running_balance, dec!(100.00));
        // Before the oldest entry the ledger was empty.
        assert_eq!(
            entries[1].running_balance - entries[1].transaction.amount,
            Decimal::ZERO
        );
    }

    #[test]
    fn zero_balance_for_unknown_store() {
        let b = StoreBalance::zero(Uuid::new_v4(), "USD");
        assert_eq!(b.available_balance, Decimal::ZERO);
        assert_eq!(b.pending_balance, Decimal::ZERO);
        assert_eq!(b.total(), Decimal::ZERO);
    }
}
