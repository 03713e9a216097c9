use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Balance-ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Duplicate webhook delivery. Callers treat this as a silent no-op,
    /// never as a failure surfaced to the sender.
    #[error("Event already applied for order {order_id} ({tx_type})")]
    DuplicateEvent { order_id: Uuid, tx_type: String },

    #[error("No captured payment found for order {0}")]
    PaymentNotCaptured(Uuid),

    #[error("Refund of {requested} exceeds remaining refundable amount {remaining} for order {order_id}")]
    OverRefund {
        order_id: Uuid,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),
}

/// Payout-related errors
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("Payout not found: {0}")]
    NotFound(Uuid),

    #[error("Payout {0} already completed")]
    AlreadyCompleted(Uuid),

    #[error("Payout in invalid state: {current}, expected: {expected}")]
    InvalidState { current: String, expected: String },

    #[error("Invalid payout amount: {0}")]
    InvalidAmount(Decimal),

    #[error("Requested payout {requested} exceeds available balance {available}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Store {0} has no payout-capable provider account")]
    PayoutsDisabled(Uuid),

    #[error("Store {0} has no bank details on file")]
    MissingBankDetails(Uuid),

    #[error("Bank details envelope is invalid: {0}")]
    BankDetailsCipher(String),
}

/// Payout schedule errors
#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("Store has no payout schedule configured")]
    MissingSchedule,

    #[error("Invalid payout day of week: {0} (expected 0-6, Sunday=0)")]
    InvalidDayOfWeek(i16),

    #[error("Invalid payout day of month: {0} (expected 1-31)")]
    InvalidDayOfMonth(i16),
}

/// Payment-provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider definitively rejected the request. Safe to mark the
    /// payout failed; no funds moved.
    #[error("Transfer rejected by provider: {code}: {message}")]
    TransferRejected { code: String, message: String },

    /// Ambiguous outcome. The provider may have executed the transfer, so
    /// the payout must stay in `processing` for manual reconciliation.
    #[error("Provider request timed out")]
    Timeout,

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::Ledger(LedgerError::OverRefund {
                order_id,
                requested,
                remaining,
            }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "OVER_REFUND",
                format!(
                    "Refund exceeds remaining refundable amount for order {}",
                    order_id
                ),
                Some(serde_json::json!({
                    "order_id": order_id,
                    "requested": requested.to_string(),
                    "remaining": remaining.to_string(),
                })),
            ),
            AppError::Ledger(LedgerError::PaymentNotCaptured(order_id)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PAYMENT_NOT_CAPTURED",
                format!("No captured payment found for order {}", order_id),
                None,
            ),
            AppError::Ledger(LedgerError::NonPositiveAmount(amount)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_AMOUNT",
                format!("Amount must be positive, got {}", amount),
                None,
            ),
            AppError::Payout(PayoutError::NotFound(id)) => (
                StatusCode::NOT_FOUND,
                "PAYOUT_NOT_FOUND",
                format!("Payout not found: {}", id),
                None,
            ),
            AppError::Payout(PayoutError::AlreadyCompleted(id)) => (
                StatusCode::CONFLICT,
                "PAYOUT_ALREADY_COMPLETED",
                format!("Payout {} has already been completed", id),
                None,
            ),
            AppError::Payout(PayoutError::InvalidState { current, expected }) => (
                StatusCode::CONFLICT,
                "PAYOUT_INVALID_STATE",
                format!("Payout in state {}, expected {}", current, expected),
                None,
            ),
            AppError::Payout(PayoutError::InvalidAmount(amount)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PAYOUT_AMOUNT",
                format!("Invalid payout amount: {}", amount),
                None,
            ),
            AppError::Payout(PayoutError::InsufficientBalance { available, requested }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INSUFFICIENT_BALANCE",
                "Requested payout exceeds the available balance".to_string(),
                Some(serde_json::json!({
                    "available": available.to_string(),
                    "requested": requested.to_string(),
                })),
            ),
            AppError::Payout(PayoutError::PayoutsDisabled(store_id)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "PAYOUTS_DISABLED",
                format!("Store {} has no payout-capable provider account", store_id),
                None,
            ),
            AppError::Payout(PayoutError::MissingBankDetails(store_id)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "MISSING_BANK_DETAILS",
                format!("Store {} has no bank details on file", store_id),
                None,
            ),
            AppError::Schedule(err) => (
                StatusCode::BAD_REQUEST,
                "INVALID_SCHEDULE",
                err.to_string(),
                None,
            ),
            AppError::Provider(ProviderError::TransferRejected { code, message }) => (
                StatusCode::BAD_GATEWAY,
                "TRANSFER_REJECTED",
                format!("Provider rejected the transfer: {}", message),
                Some(serde_json::json!({ "provider_code": code })),
            ),
            AppError::Provider(ProviderError::Timeout) => (
                StatusCode::GATEWAY_TIMEOUT,
                "PROVIDER_TIMEOUT",
                "Provider request timed out; payout left in processing for reconciliation"
                    .to_string(),
                None,
            ),
            AppError::Provider(ProviderError::Unavailable(msg)) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_UNAVAILABLE",
                format!("Provider unavailable: {}", msg),
                None,
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg, None),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            AppError::Unauthorized(_) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid credentials".to_string(),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<rust_decimal::Error> for AppError {
    fn from(error: rust_decimal::Error) -> Self {
        AppError::InvalidInput(format!("Decimal conversion error: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::Provider(ProviderError::Timeout)
        } else {
            AppError::Provider(ProviderError::Unavailable(format!("{:?}", error)))
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
