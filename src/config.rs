use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_address: String,

    /// Shared secret presented by the external cron runner (and accepted
    /// for admin payout completion).
    pub cron_secret: String,
    /// HMAC key for order-event webhook signatures.
    pub webhook_secret: String,
    /// Key material for bank-detail encryption at rest (base64, 32 bytes).
    pub bank_details_key: String,

    pub card_network_api_url: String,
    pub card_network_api_key: String,
    /// Bound on every outbound provider call, seconds.
    pub provider_timeout_secs: u64,
    /// Bound on one store's payout inside a scheduled pass, seconds.
    pub payout_store_timeout_secs: u64,

    /// Chargeback-risk hold applied to order-payment credits, days.
    pub hold_period_days: i64,
    pub platform_fee_percent: Decimal,
    pub provider_fee_percent: Decimal,
    /// Minimum payout applied when a store has no settings row yet.
    pub default_minimum_payout: Decimal,
    /// Currency reported for stores that have never transacted.
    pub default_currency: String,

    pub hold_promotion_interval_secs: u64,
    pub payout_pass_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/seller_ledger".to_string()),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cron_secret: std::env::var("CRON_SECRET").map_err(|_| {
                config::ConfigError::NotFound("CRON_SECRET must be set".to_string())
            })?,
            webhook_secret: std::env::var("WEBHOOK_SECRET").map_err(|_| {
                config::ConfigError::NotFound("WEBHOOK_SECRET must be set".to_string())
            })?,
            bank_details_key: std::env::var("BANK_DETAILS_KEY").map_err(|_| {
                config::ConfigError::NotFound("BANK_DETAILS_KEY must be set".to_string())
            })?,
            card_network_api_url: std::env::var("CARD_NETWORK_API_URL")
                .unwrap_or_else(|_| "https://api.cardnetwork.example".to_string()),
            card_network_api_key: std::env::var("CARD_NETWORK_API_KEY").unwrap_or_default(),
            provider_timeout_secs: env_u64("PROVIDER_TIMEOUT_SECS", 15),
            payout_store_timeout_secs: env_u64("PAYOUT_STORE_TIMEOUT_SECS", 30),
            hold_period_days: env_u64("HOLD_PERIOD_DAYS", 7) as i64,
            platform_fee_percent: env_decimal("PLATFORM_FEE_PERCENT", dec!(5.0)),
            provider_fee_percent: env_decimal("PROVIDER_FEE_PERCENT", dec!(2.9)),
            default_minimum_payout: env_decimal("DEFAULT_MINIMUM_PAYOUT", dec!(25.00)),
            default_currency: std::env::var("DEFAULT_CURRENCY")
                .unwrap_or_else(|_| "USD".to_string()),
            hold_promotion_interval_secs: env_u64("HOLD_PROMOTION_INTERVAL_SECS", 600),
            payout_pass_interval_secs: env_u64("PAYOUT_PASS_INTERVAL_SECS", 3600),
        })
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_decimal(name: &str, default: Decimal) -> Decimal {
    std::env::var(name)
        .ok()
        .and_then(|v| Decimal::from_str(&v).ok())
        .unwrap_or(default)
}
