use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_method", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_schedule", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutSchedule {
    Weekly,
    Biweekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutProvider {
    CardNetwork,
    RegionalWallet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Failed => "failed",
        }
    }

    /// Forward-only lifecycle: pending -> processing -> completed | failed.
    pub fn can_transition_to(&self, next: PayoutStatus) -> bool {
        matches!(
            (self, next),
            (PayoutStatus::Pending, PayoutStatus::Processing)
                | (PayoutStatus::Pending, PayoutStatus::Failed)
                | (PayoutStatus::Processing, PayoutStatus::Completed)
                | (PayoutStatus::Processing, PayoutStatus::Failed)
        )
    }
}

impl std::fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-store payout configuration. `bank_details_encrypted` is an opaque
/// ciphertext envelope and is never serialized out of the service.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PayoutSettings {
    pub store_id: Uuid,
    pub method: PayoutMethod,
    pub schedule: Option<PayoutSchedule>,
    pub payout_day_of_week: Option<i16>,
    pub payout_day_of_month: Option<i16>,
    pub minimum_amount: Decimal,
    pub next_payout_at: Option<DateTime<Utc>>,
    pub provider: PayoutProvider,
    pub payouts_enabled: bool,
    #[serde(skip_serializing)]
    pub bank_details_encrypted: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Payout {
    pub id: Uuid,
    pub store_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub provider: PayoutProvider,
    pub provider_payout_id: Option<String>,
    pub status: PayoutStatus,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One row of the scheduler's eligibility query: settings joined against
/// the live available balance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EligibleStore {
    pub store_id: Uuid,
    pub available_balance: Decimal,
    pub currency: String,
    pub minimum_amount: Decimal,
    pub schedule: Option<PayoutSchedule>,
    pub payout_day_of_week: Option<i16>,
    pub payout_day_of_month: Option<i16>,
    pub next_payout_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize)]
pub struct PassSummary {
    pub processed: u64,
    pub skipped: u64,
    pub errors: Vec<PassError>,
}

#[derive(Debug, Serialize)]
pub struct PassError {
    pub store_id: Uuid,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_is_forward_only() {
        assert!(PayoutStatus::Pending.can_transition_to(PayoutStatus::Processing));
        assert!(PayoutStatus::Processing.can_transition_to(PayoutStatus::Completed));
        assert!(PayoutStatus::Processing.can_transition_to(PayoutStatus::Failed));
        assert!(!PayoutStatus::Completed.can_transition_to(PayoutStatus::Processing));
        assert!(!PayoutStatus::Failed.can_transition_to(PayoutStatus::Completed));
        assert!(!PayoutStatus::Pending.can_transition_to(PayoutStatus::Completed));
    }
}
