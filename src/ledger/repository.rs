use super::models::*;
use crate::error::{AppError, AppResult, LedgerError, PayoutError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info};
use uuid::Uuid;

/// Partial unique index enforcing one order_payment row per order.
const ORDER_PAYMENT_UNIQUE: &str = "uq_order_payment_once";

const SELECT_ORDER_PAYMENT: &str = r#"
    SELECT id, store_id, tx_type, amount, currency, status, available_at,
           order_id, created_at
    FROM balance_transactions
    WHERE order_id = $1 AND tx_type = 'order_payment'
"#;

const SUM_REFUNDED: &str = r#"
    SELECT COALESCE(-SUM(amount), 0)
    FROM balance_transactions
    WHERE order_id = $1 AND tx_type = 'refund'
"#;

const SUM_PLATFORM_FEE: &str = r#"
    SELECT COALESCE(-SUM(amount), 0)
    FROM balance_transactions
    WHERE order_id = $1 AND tx_type = 'platform_fee'
"#;

/// Balance ledger repository - the source of truth for store money state.
///
/// Every mutation is a single atomic read-modify-write: the balance row is
/// locked with FOR UPDATE and updated in the same database transaction as
/// the balance_transactions write, so concurrent operations on one store
/// serialize while different stores proceed independently.
pub struct LedgerRepository {
    pub pool: PgPool,
    default_currency: String,
}

impl LedgerRepository {
    pub fn new(pool: PgPool, default_currency: &str) -> Self {
        Self {
            pool,
            default_currency: default_currency.to_string(),
        }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Append a transaction and move the store balance in one atomic unit.
    ///
    /// Holdable types with `hold_days > 0` land as `pending` with
    /// `available_at = now + hold_days` and credit the pending balance;
    /// everything else is immediately `available`.
    pub async fn post_transaction(
        &self,
        store_id: Uuid,
        tx_type: TransactionType,
        amount: Decimal,
        currency: &str,
        hold_days: i64,
        order_id: Option<Uuid>,
    ) -> AppResult<BalanceTransaction> {
        let mut tx = self.begin_tx().await?;
        let posted = self
            .post_transaction_in(&mut tx, store_id, tx_type, amount, currency, hold_days, order_id)
            .await?;
        tx.commit().await?;
        Ok(posted)
    }

    /// Same as [`post_transaction`] but composable into a caller-owned
    /// database transaction, so multi-row postings (capture + fees) commit
    /// together or not at all.
    pub async fn post_transaction_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        store_id: Uuid,
        tx_type: TransactionType,
        amount: Decimal,
        currency: &str,
        hold_days: i64,
        order_id: Option<Uuid>,
    ) -> AppResult<BalanceTransaction> {
        let amount = round_money(amount);

        self.lock_balance_row(tx, store_id, currency).await?;

        let (status, available_at) = if tx_type.is_holdable() && hold_days > 0 {
            (
                TransactionStatus::Pending,
                Some(Utc::now() + chrono::Duration::days(hold_days)),
            )
        } else {
            (TransactionStatus::Available, None)
        };

        let posted = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            INSERT INTO balance_transactions
                (store_id, tx_type, amount, currency, status, available_at, order_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, store_id, tx_type, amount, currency, status, available_at,
                      order_id, created_at
            "#,
        )
        .bind(store_id)
        .bind(tx_type)
        .bind(amount)
        .bind(currency)
        .bind(status)
        .bind(available_at)
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(e, order_id, tx_type))?;

        let balance_column = match status {
            TransactionStatus::Pending => "pending_balance",
            _ => "available_balance",
        };
        let update = format!(
            "UPDATE store_balances SET {col} = {col} + $2, updated_at = NOW() WHERE store_id = $1",
            col = balance_column
        );
        sqlx::query(&update)
            .bind(store_id)
            .bind(amount)
            .execute(&mut **tx)
            .await?;

        Ok(posted)
    }

    /// Debit the available balance for an executed payout.
    ///
    /// The payout row is posted as `available` (a negative amount), which
    /// keeps the per-status sum invariant for partial payouts. When the
    /// payout drains the available balance to zero, every `available` row
    /// (now summing to zero) is swept to `paid_out`.
    ///
    /// The balance is re-read under the row lock: a payout may never
    /// drive the available balance negative, no matter what the caller
    /// saw before the lock was taken.
    pub async fn post_payout_debit_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        store_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<BalanceTransaction> {
        let amount = round_money(amount);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount).into());
        }

        self.lock_balance_row(tx, store_id, currency).await?;

        let available: Decimal =
            sqlx::query_scalar("SELECT available_balance FROM store_balances WHERE store_id = $1")
                .bind(store_id)
                .fetch_one(&mut **tx)
                .await?;
        if amount > available {
            return Err(PayoutError::InsufficientBalance {
                available,
                requested: amount,
            }
            .into());
        }

        let posted = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            INSERT INTO balance_transactions
                (store_id, tx_type, amount, currency, status)
            VALUES ($1, 'payout', $2, $3, 'available')
            RETURNING id, store_id, tx_type, amount, currency, status, available_at,
                      order_id, created_at
            "#,
        )
        .bind(store_id)
        .bind(-amount)
        .bind(currency)
        .fetch_one(&mut **tx)
        .await?;

        let remaining: Decimal = sqlx::query_scalar(
            r#"
            UPDATE store_balances
            SET available_balance = available_balance - $2, updated_at = NOW()
            WHERE store_id = $1
            RETURNING available_balance
            "#,
        )
        .bind(store_id)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await?;

        if remaining == Decimal::ZERO {
            sqlx::query(
                "UPDATE balance_transactions SET status = 'paid_out' \
                 WHERE store_id = $1 AND status = 'available'",
            )
            .bind(store_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(posted)
    }

    /// Promote every matured hold: pending -> available, moving the amount
    /// from the pending to the available balance.
    ///
    /// Each promotion is its own atomic unit: one failure is recorded and
    /// never blocks the rest, and the guarded status UPDATE makes a repeat
    /// run a no-op for already-promoted rows.
    pub async fn promote_matured_holds(&self, now: DateTime<Utc>) -> AppResult<PromotionSummary> {
        let matured: Vec<(Uuid, Uuid, Decimal)> = sqlx::query_as(
            r#"
            SELECT id, store_id, amount
            FROM balance_transactions
            WHERE status = 'pending' AND available_at <= $1
            ORDER BY available_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut summary = PromotionSummary::default();
        for (tx_id, store_id, amount) in matured {
            match self.promote_one(tx_id, store_id, amount).await {
                Ok(true) => summary.promoted += 1,
                Ok(false) => {} // already promoted by a concurrent run
                Err(e) => {
                    error!(
                        "Failed to promote hold {} for store {}: {:?}",
                        tx_id, store_id, e
                    );
                    summary.errors.push(PromotionError {
                        transaction_id: tx_id,
                        store_id,
                        message: e.to_string(),
                    });
                }
            }
        }

        if summary.promoted > 0 {
            info!("Promoted {} matured holds to available", summary.promoted);
        }
        Ok(summary)
    }

    async fn promote_one(&self, tx_id: Uuid, store_id: Uuid, amount: Decimal) -> AppResult<bool> {
        let mut tx = self.begin_tx().await?;

        sqlx::query("SELECT store_id FROM store_balances WHERE store_id = $1 FOR UPDATE")
            .bind(store_id)
            .fetch_one(&mut *tx)
            .await?;

        let flipped = sqlx::query(
            "UPDATE balance_transactions SET status = 'available' \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(tx_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if flipped == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE store_balances
            SET pending_balance = pending_balance - $2,
                available_balance = available_balance + $2,
                updated_at = NOW()
            WHERE store_id = $1
            "#,
        )
        .bind(store_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Balance snapshot; a store with no transactions reads as zero.
    pub async fn get_balance(&self, store_id: Uuid) -> AppResult<StoreBalance> {
        let balance = sqlx::query_as::<_, StoreBalance>(
            r#"
            SELECT store_id, available_balance, pending_balance, currency, updated_at
            FROM store_balances
            WHERE store_id = $1
            "#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(balance.unwrap_or_else(|| StoreBalance::zero(store_id, &self.default_currency)))
    }

    /// Paged activity feed, newest first, with a running balance that walks
    /// the ledger backward from the current combined balance.
    pub async fn get_activity_feed(
        &self,
        store_id: Uuid,
        page: i64,
        page_size: i64,
    ) -> AppResult<Vec<LedgerEntry>> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, 100);
        let offset = (page - 1) * page_size;

        let balance = self.get_balance(store_id).await?;

        // Sum of the `offset` transactions newer than this page, so the
        // page's first entry starts from the right running total.
        let newer_sum: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM (
                SELECT amount
                FROM balance_transactions
                WHERE store_id = $1
                ORDER BY seq DESC
                LIMIT $2
            ) newer
            "#,
        )
        .bind(store_id)
        .bind(offset)
        .fetch_one(&self.pool)
        .await?;

        let transactions = sqlx::query_as::<_, BalanceTransaction>(
            r#"
            SELECT id, store_id, tx_type, amount, currency, status, available_at,
                   order_id, created_at
            FROM balance_transactions
            WHERE store_id = $1
            ORDER BY seq DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(store_id)
        .bind(page_size)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(with_running_balances(balance.total() - newer_sum, transactions))
    }

    /// The captured order-payment credit for an order, if any.
    pub async fn get_order_payment(&self, order_id: Uuid) -> AppResult<Option<BalanceTransaction>> {
        let tx = sqlx::query_as::<_, BalanceTransaction>(SELECT_ORDER_PAYMENT)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(tx)
    }

    /// [`get_order_payment`] inside a caller-owned transaction, so refund
    /// guards read under the store's balance-row lock.
    pub async fn get_order_payment_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<Option<BalanceTransaction>> {
        let payment = sqlx::query_as::<_, BalanceTransaction>(SELECT_ORDER_PAYMENT)
            .bind(order_id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(payment)
    }

    /// Cumulative amount already refunded for an order, as a positive number.
    pub async fn refunded_total(&self, order_id: Uuid) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(SUM_REFUNDED)
            .bind(order_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    /// [`refunded_total`] inside a caller-owned transaction.
    pub async fn refunded_total_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(SUM_REFUNDED)
            .bind(order_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(total)
    }

    /// The platform fee charged on an order, as a positive number.
    pub async fn platform_fee_for_order_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
    ) -> AppResult<Decimal> {
        let fee: Decimal = sqlx::query_scalar(SUM_PLATFORM_FEE)
            .bind(order_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(fee)
    }

    /// Create the balance row if missing, then lock it for the remainder of
    /// the enclosing transaction. Same-store money movements serialize on
    /// this lock.
    pub async fn lock_balance_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        store_id: Uuid,
        currency: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO store_balances (store_id, currency) VALUES ($1, $2) \
             ON CONFLICT (store_id) DO NOTHING",
        )
        .bind(store_id)
        .bind(currency)
        .execute(&mut **tx)
        .await?;

        sqlx::query("SELECT store_id FROM store_balances WHERE store_id = $1 FOR UPDATE")
            .bind(store_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(())
    }
}

fn map_unique_violation(e: sqlx::Error, order_id: Option<Uuid>, tx_type: TransactionType) -> AppError {
    let is_duplicate = e
        .as_database_error()
        .and_then(|db| db.constraint())
        .map(|c| c == ORDER_PAYMENT_UNIQUE)
        .unwrap_or(false);

    match (is_duplicate, order_id) {
        (true, Some(order_id)) => LedgerError::DuplicateEvent {
            order_id,
            tx_type: tx_type.as_str().to_string(),
        }
        .into(),
        _ => AppError::Database(e),
    }
}
