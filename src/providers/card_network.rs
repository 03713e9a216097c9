use super::TransferConfirmation;
use crate::error::{AppError, ProviderError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// HTTP client for the card-network payout provider.
///
/// Every call carries a bounded timeout; a timed-out transfer is reported
/// as [`ProviderError::Timeout`] because the provider may still have
/// executed it, and the caller must not treat it as a failure.
pub struct CardNetworkClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CreateTransferRequest<'a> {
    destination_account: Uuid,
    amount: Decimal,
    currency: &'a str,
    /// Client-chosen reference; reusing it makes retries safe on the
    /// provider side.
    reference: Uuid,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    id: String,
    status: String,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl CardNetworkClient {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("card network client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Push funds to the store's card-network account.
    pub async fn create_transfer(
        &self,
        store_id: Uuid,
        amount: Decimal,
        currency: &str,
        reference: Uuid,
    ) -> Result<TransferConfirmation, ProviderError> {
        let url = format!("{}/v1/transfers", self.base_url);
        let request = CreateTransferRequest {
            destination_account: store_id,
            amount,
            currency,
            reference,
        };

        info!(
            "💸 Card-network transfer {} for store {}: {} {}",
            reference, store_id, amount, currency
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status().is_server_error() {
            warn!(
                "Card network returned {} for transfer {}",
                response.status(),
                reference
            );
            return Err(ProviderError::Unavailable(format!(
                "card network returned {}",
                response.status()
            )));
        }

        let body: TransferResponse = response.json().await.map_err(map_transport_error)?;

        match body.status.as_str() {
            "completed" => Ok(TransferConfirmation {
                provider_payout_id: body.id,
            }),
            _ => Err(ProviderError::TransferRejected {
                code: body.error_code.unwrap_or_else(|| body.status.clone()),
                message: body
                    .error_message
                    .unwrap_or_else(|| "transfer rejected by provider".to_string()),
            }),
        }
    }

    /// Release a never-captured payment authorization.
    pub async fn void_authorization(&self, order_id: Uuid) -> Result<(), ProviderError> {
        let url = format!("{}/v1/authorizations/{}/void", self.base_url, order_id);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        if response.status().is_success() {
            info!("🧾 Voided authorization for order {}", order_id);
            return Ok(());
        }
        // already-voided is fine; the goal is that no capture happens
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(());
        }

        Err(ProviderError::Unavailable(format!(
            "void returned {}",
            response.status()
        )))
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Unavailable(e.to_string())
    }
}
