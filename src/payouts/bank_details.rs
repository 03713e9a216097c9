use crate::error::PayoutError;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    AeadCore, ChaCha20Poly1305, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Envelope prefix; bump the version if the key or algorithm rotates.
const ENVELOPE_PREFIX: &str = "enc:v1:";
const NONCE_LEN: usize = 12;

/// Regional-wallet bank account details. Plaintext only ever lives inside
/// a Zeroizing scope in the executor; it is never logged, persisted, or
/// returned from any endpoint.
#[derive(Serialize, Deserialize)]
pub struct BankDetails {
    pub account_name: String,
    pub account_number: String,
    pub routing_code: String,
    pub bank_name: Option<String>,
}

// keeps account numbers out of any derived Debug output upstream
impl std::fmt::Debug for BankDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BankDetails").finish_non_exhaustive()
    }
}

/// ChaCha20-Poly1305 cipher for bank details at rest.
///
/// Envelope format: `enc:v1:<base64(nonce || ciphertext)>`.
pub struct BankDetailsCipher {
    cipher: ChaCha20Poly1305,
}

impl BankDetailsCipher {
    /// Build from the configured base64 key; must decode to 32 bytes.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, PayoutError> {
        let key_bytes = Zeroizing::new(
            BASE64
                .decode(key_b64.trim())
                .map_err(|e| PayoutError::BankDetailsCipher(format!("invalid key encoding: {e}")))?,
        );
        if key_bytes.len() != 32 {
            return Err(PayoutError::BankDetailsCipher(format!(
                "key must be 32 bytes, got {}",
                key_bytes.len()
            )));
        }
        let key = Key::from_slice(&key_bytes);
        Ok(Self {
            cipher: ChaCha20Poly1305::new(key),
        })
    }

    pub fn encrypt(&self, details: &BankDetails) -> Result<String, PayoutError> {
        let plaintext = Zeroizing::new(
            serde_json::to_vec(details)
                .map_err(|e| PayoutError::BankDetailsCipher(e.to_string()))?,
        );

        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|e| PayoutError::BankDetailsCipher(e.to_string()))?;

        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce);
        envelope.extend_from_slice(&ciphertext);

        Ok(format!("{ENVELOPE_PREFIX}{}", BASE64.encode(envelope)))
    }

    pub fn decrypt(&self, envelope: &str) -> Result<Zeroizing<Vec<u8>>, PayoutError> {
        let encoded = envelope
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or_else(|| PayoutError::BankDetailsCipher("unrecognized envelope".to_string()))?;

        let raw = BASE64
            .decode(encoded)
            .map_err(|e| PayoutError::BankDetailsCipher(e.to_string()))?;
        if raw.len() <= NONCE_LEN {
            return Err(PayoutError::BankDetailsCipher("envelope too short".to_string()));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| PayoutError::BankDetailsCipher("decryption failed".to_string()))?;

        Ok(Zeroizing::new(plaintext))
    }

    pub fn decrypt_details(&self, envelope: &str) -> Result<BankDetails, PayoutError> {
        let plaintext = self.decrypt(envelope)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| PayoutError::BankDetailsCipher(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> BankDetailsCipher {
        BankDetailsCipher::from_base64_key(&BASE64.encode([7u8; 32])).unwrap()
    }

    fn sample() -> BankDetails {
        BankDetails {
            account_name: "Acme Goods LLC".to_string(),
            account_number: "0011223344".to_string(),
            routing_code: "WLT-559".to_string(),
            bank_name: Some("First Regional".to_string()),
        }
    }

    #[test]
    fn round_trips_details() {
        let cipher = test_cipher();
        let envelope = cipher.encrypt(&sample()).unwrap();
        assert!(envelope.starts_with("enc:v1:"));

        let decrypted = cipher.decrypt_details(&envelope).unwrap();
        assert_eq!(decrypted.account_number, "0011223344");
        assert_eq!(decrypted.routing_code, "WLT-559");
    }

    #[test]
    fn envelope_never_contains_plaintext() {
        let cipher = test_cipher();
        let envelope = cipher.encrypt(&sample()).unwrap();
        assert!(!envelope.contains("0011223344"));
    }

    #[test]
    fn tampered_envelope_is_rejected() {
        let cipher = test_cipher();
        let mut envelope = cipher.encrypt(&sample()).unwrap();
        envelope.pop();
        envelope.push('A');
        assert!(cipher.decrypt_details(&envelope).is_err());
    }

    #[test]
    fn wrong_key_fails_closed() {
        let envelope = test_cipher().encrypt(&sample()).unwrap();
        let other = BankDetailsCipher::from_base64_key(&BASE64.encode([9u8; 32])).unwrap();
        assert!(other.decrypt_details(&envelope).is_err());
    }

    #[test]
    fn rejects_short_keys() {
        assert!(BankDetailsCipher::from_base64_key(&BASE64.encode([1u8; 16])).is_err());
    }
}
