use crate::error::AppError;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Shared-secret check for cron and admin endpoints.
pub fn require_cron_secret(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let presented = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing cron secret".to_string()))?;

    // compare MACs of both values so the check is constant-time
    let rejected = || AppError::Unauthorized("invalid cron secret".to_string());

    let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).map_err(|_| rejected())?;
    mac.update(presented.as_bytes());
    let presented_mac = mac.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(expected.as_bytes()).map_err(|_| rejected())?;
    mac.update(expected.as_bytes());
    mac.verify_slice(&presented_mac).map_err(|_| rejected())
}

/// HMAC-SHA256 signature check over the raw webhook body. The signature
/// arrives hex-encoded in `x-webhook-signature`.
pub fn verify_webhook_signature(
    headers: &HeaderMap,
    secret: &str,
    body: &[u8],
) -> Result<(), AppError> {
    let signature_hex = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;

    let signature = hex::decode(signature_hex)
        .map_err(|_| AppError::Unauthorized("malformed webhook signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Unauthorized("invalid webhook signature".to_string()))?;
    mac.update(body);
    mac.verify_slice(&signature)
        .map_err(|_| AppError::Unauthorized("invalid webhook signature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let body = br#"{"event_type":"payment_captured"}"#;
        let mut headers = HeaderMap::new();
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            HeaderValue::from_str(&sign("topsecret", body)).unwrap(),
        );
        assert!(verify_webhook_signature(&headers, "topsecret", body).is_ok());
    }

    #[test]
    fn rejects_a_tampered_body() {
        let mut headers = HeaderMap::new();
        headers.insert(
            WEBHOOK_SIGNATURE_HEADER,
            HeaderValue::from_str(&sign("topsecret", b"original")).unwrap(),
        );
        assert!(verify_webhook_signature(&headers, "topsecret", b"tampered").is_err());
    }

    #[test]
    fn rejects_a_missing_signature() {
        let headers = HeaderMap::new();
        assert!(verify_webhook_signature(&headers, "topsecret", b"body").is_err());
    }

    #[test]
    fn cron_secret_must_match() {
        let mut headers = HeaderMap::new();
        headers.insert(CRON_SECRET_HEADER, HeaderValue::from_static("right"));
        assert!(require_cron_secret(&headers, "right").is_ok());
        assert!(require_cron_secret(&headers, "other").is_err());
        assert!(require_cron_secret(&HeaderMap::new(), "right").is_err());
    }
}
