use crate::payouts::bank_details::BankDetails;
use crate::payouts::models::*;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePayoutSettingsRequest {
    pub method: PayoutMethod,
    pub schedule: Option<PayoutSchedule>,
    #[validate(range(min = 0, max = 6))]
    pub payout_day_of_week: Option<i16>,
    #[validate(range(min = 1, max = 31))]
    pub payout_day_of_month: Option<i16>,
    pub minimum_amount: Option<Decimal>,
    pub provider: PayoutProvider,
    pub payouts_enabled: bool,
    /// Plaintext bank details; encrypted before they touch the database
    /// and never echoed back.
    pub bank_details: Option<BankDetails>,
}

#[derive(Debug, Deserialize)]
pub struct ManualPayoutRequest {
    pub amount: Decimal,
}

/// Order-management webhook events, tagged by `event_type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OrderEvent {
    PaymentCaptured {
        order_id: Uuid,
        store_id: Uuid,
        amount: Decimal,
        currency: String,
        provider: String,
    },
    RefundIssued {
        order_id: Uuid,
        store_id: Uuid,
        amount: Decimal,
        currency: String,
    },
    OrderCancelled {
        order_id: Uuid,
        store_id: Uuid,
    },
    DisputeOpened {
        order_id: Uuid,
        store_id: Uuid,
        amount: Decimal,
        currency: String,
    },
}

/// Settings as exposed to sellers; bank details reduce to a presence flag.
#[derive(Debug, Serialize)]
pub struct PayoutSettingsResponse {
    pub store_id: Uuid,
    pub method: PayoutMethod,
    pub schedule: Option<PayoutSchedule>,
    pub payout_day_of_week: Option<i16>,
    pub payout_day_of_month: Option<i16>,
    pub minimum_amount: Decimal,
    pub next_payout_at: Option<DateTime<Utc>>,
    pub provider: PayoutProvider,
    pub payouts_enabled: bool,
    pub has_bank_details: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<PayoutSettings> for PayoutSettingsResponse {
    fn from(s: PayoutSettings) -> Self {
        Self {
            store_id: s.store_id,
            method: s.method,
            schedule: s.schedule,
            payout_day_of_week: s.payout_day_of_week,
            payout_day_of_month: s.payout_day_of_month,
            minimum_amount: s.minimum_amount,
            next_payout_at: s.next_payout_at,
            provider: s.provider,
            payouts_enabled: s.payouts_enabled,
            has_bank_details: s.bank_details_encrypted.is_some(),
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn order_events_deserialize_by_tag() {
        let event: OrderEvent = serde_json::from_str(
            r#"{
                "event_type": "payment_captured",
                "order_id": "a3bb189e-8bf9-3888-9912-ace4e6543002",
                "store_id": "b4cc289e-8bf9-3888-9912-ace4e6543003",
                "amount": "100.00",
                "currency": "USD",
                "provider": "card_network"
            }"#,
        )
        .unwrap();

        match event {
            OrderEvent::PaymentCaptured { amount, currency, .. } => {
                assert_eq!(amount, dec!(100.00));
                assert_eq!(currency, "USD");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let result: Result<OrderEvent, _> = serde_json::from_str(
            r#"{"event_type": "inventory_synced", "order_id": "a3bb189e-8bf9-3888-9912-ace4e6543002"}"#,
        );
        assert!(result.is_err());
    }
}
