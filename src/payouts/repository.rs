use super::models::*;
use crate::error::{AppResult, PayoutError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Full replacement payload for a store's payout settings. A `None`
/// `bank_details_encrypted` preserves whatever is already stored.
#[derive(Debug)]
pub struct SettingsUpdate {
    pub method: PayoutMethod,
    pub schedule: Option<PayoutSchedule>,
    pub payout_day_of_week: Option<i16>,
    pub payout_day_of_month: Option<i16>,
    pub minimum_amount: Decimal,
    pub next_payout_at: Option<DateTime<Utc>>,
    pub provider: PayoutProvider,
    pub payouts_enabled: bool,
    pub bank_details_encrypted: Option<String>,
}

pub struct PayoutRepository {
    pub pool: PgPool,
}

impl PayoutRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_settings(&self, store_id: Uuid) -> AppResult<Option<PayoutSettings>> {
        let settings = sqlx::query_as::<_, PayoutSettings>(
            r#"
            SELECT store_id, method, schedule, payout_day_of_week, payout_day_of_month,
                   minimum_amount, next_payout_at, provider, payouts_enabled,
                   bank_details_encrypted, updated_at
            FROM payout_settings
            WHERE store_id = $1
            "#,
        )
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    pub async fn upsert_settings(
        &self,
        store_id: Uuid,
        update: SettingsUpdate,
    ) -> AppResult<PayoutSettings> {
        let settings = sqlx::query_as::<_, PayoutSettings>(
            r#"
            INSERT INTO payout_settings
                (store_id, method, schedule, payout_day_of_week, payout_day_of_month,
                 minimum_amount, next_payout_at, provider, payouts_enabled,
                 bank_details_encrypted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (store_id) DO UPDATE SET
                method = EXCLUDED.method,
                schedule = EXCLUDED.schedule,
                payout_day_of_week = EXCLUDED.payout_day_of_week,
                payout_day_of_month = EXCLUDED.payout_day_of_month,
                minimum_amount = EXCLUDED.minimum_amount,
                next_payout_at = EXCLUDED.next_payout_at,
                provider = EXCLUDED.provider,
                payouts_enabled = EXCLUDED.payouts_enabled,
                bank_details_encrypted =
                    COALESCE(EXCLUDED.bank_details_encrypted,
                             payout_settings.bank_details_encrypted),
                updated_at = NOW()
            RETURNING store_id, method, schedule, payout_day_of_week, payout_day_of_month,
                      minimum_amount, next_payout_at, provider, payouts_enabled,
                      bank_details_encrypted, updated_at
            "#,
        )
        .bind(store_id)
        .bind(update.method)
        .bind(update.schedule)
        .bind(update.payout_day_of_week)
        .bind(update.payout_day_of_month)
        .bind(update.minimum_amount)
        .bind(update.next_payout_at)
        .bind(update.provider)
        .bind(update.payouts_enabled)
        .bind(update.bank_details_encrypted)
        .fetch_one(&self.pool)
        .await?;

        Ok(settings)
    }

    pub async fn set_next_payout_at(
        &self,
        store_id: Uuid,
        next_payout_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE payout_settings SET next_payout_at = $2, updated_at = NOW() \
             WHERE store_id = $1",
        )
        .bind(store_id)
        .bind(next_payout_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stores due for an automatic payout: schedule matured, payouts
    /// enabled, and enough available money to clear their minimum.
    pub async fn find_eligible_stores(&self, now: DateTime<Utc>) -> AppResult<Vec<EligibleStore>> {
        let stores = sqlx::query_as::<_, EligibleStore>(
            r#"
            SELECT s.store_id, b.available_balance, b.currency, s.minimum_amount,
                   s.schedule, s.payout_day_of_week, s.payout_day_of_month,
                   s.next_payout_at
            FROM payout_settings s
            JOIN store_balances b ON b.store_id = s.store_id
            WHERE s.method = 'automatic'
              AND s.payouts_enabled
              AND s.next_payout_at IS NOT NULL
              AND s.next_payout_at <= $1
              AND b.available_balance > 0
              AND b.available_balance >= s.minimum_amount
            ORDER BY s.next_payout_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(stores)
    }

    pub async fn create_payout(
        &self,
        store_id: Uuid,
        amount: Decimal,
        currency: &str,
        provider: PayoutProvider,
        status: PayoutStatus,
    ) -> AppResult<Payout> {
        let payout = sqlx::query_as::<_, Payout>(
            r#"
            INSERT INTO payouts (store_id, amount, currency, provider, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, store_id, amount, currency, provider, provider_payout_id,
                      status, failure_reason, created_at, completed_at
            "#,
        )
        .bind(store_id)
        .bind(amount)
        .bind(currency)
        .bind(provider)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        Ok(payout)
    }

    pub async fn get_payout(&self, payout_id: Uuid) -> AppResult<Option<Payout>> {
        let payout = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, store_id, amount, currency, provider, provider_payout_id,
                   status, failure_reason, created_at, completed_at
            FROM payouts
            WHERE id = $1
            "#,
        )
        .bind(payout_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payout)
    }

    pub async fn list_payouts(&self, store_id: Uuid, limit: i64) -> AppResult<Vec<Payout>> {
        let payouts = sqlx::query_as::<_, Payout>(
            r#"
            SELECT id, store_id, amount, currency, provider, provider_payout_id,
                   status, failure_reason, created_at, completed_at
            FROM payouts
            WHERE store_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(store_id)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;

        Ok(payouts)
    }

    /// Guarded status transition; a zero-row update means the payout is no
    /// longer in `from`, which is surfaced as a typed error.
    pub async fn transition(
        &self,
        payout_id: Uuid,
        from: PayoutStatus,
        to: PayoutStatus,
    ) -> AppResult<()> {
        let moved = sqlx::query("UPDATE payouts SET status = $3 WHERE id = $1 AND status = $2")
            .bind(payout_id)
            .bind(from)
            .bind(to)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if moved == 0 {
            return Err(self.transition_conflict(payout_id, from).await?.into());
        }
        Ok(())
    }

    pub async fn mark_failed(&self, payout_id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE payouts SET status = 'failed', failure_reason = $2 \
             WHERE id = $1 AND status IN ('pending', 'processing')",
        )
        .bind(payout_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_provider_payout_id(
        &self,
        payout_id: Uuid,
        provider_payout_id: &str,
    ) -> AppResult<()> {
        sqlx::query("UPDATE payouts SET provider_payout_id = $2 WHERE id = $1")
            .bind(payout_id)
            .bind(provider_payout_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// `processing -> completed` inside a caller-owned transaction, so the
    /// ledger debit commits with it or not at all.
    pub async fn complete_in(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payout_id: Uuid,
    ) -> AppResult<Payout> {
        let payout = sqlx::query_as::<_, Payout>(
            r#"
            UPDATE payouts
            SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING id, store_id, amount, currency, provider, provider_payout_id,
                      status, failure_reason, created_at, completed_at
            "#,
        )
        .bind(payout_id)
        .fetch_optional(&mut **tx)
        .await?;

        match payout {
            Some(payout) => Ok(payout),
            None => Err(self
                .transition_conflict(payout_id, PayoutStatus::Processing)
                .await?
                .into()),
        }
    }

    async fn transition_conflict(
        &self,
        payout_id: Uuid,
        expected: PayoutStatus,
    ) -> AppResult<PayoutError> {
        Ok(match self.get_payout(payout_id).await? {
            None => PayoutError::NotFound(payout_id),
            Some(p) if p.status == PayoutStatus::Completed => PayoutError::AlreadyCompleted(p.id),
            Some(p) => PayoutError::InvalidState {
                current: p.status.as_str().to_string(),
                expected: expected.as_str().to_string(),
            },
        })
    }
}
