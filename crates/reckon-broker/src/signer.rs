//! Request signing.
//!
//! prehash = path (with query) + METHOD + timestamp_ms + nonce + body
//! sign    = base64( hex( HMAC-SHA256(secret, prehash) ) )
//!
//! The base64 step encodes the ASCII hex digest, not the raw MAC bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::BrokerError;

type HmacSha256 = Hmac<Sha256>;

pub const HEADER_KEY: &str = "ACCESS-KEY";
pub const HEADER_SIGN: &str = "ACCESS-SIGN";
pub const HEADER_TIMESTAMP: &str = "ACCESS-TIMESTAMP";
pub const HEADER_NONCE: &str = "ACCESS-NONCE";
pub const HEADER_PASSPHRASE: &str = "ACCESS-PASSPHRASE";

/// Header name/value pairs to attach to one request.
pub type SignedHeaders = Vec<(&'static str, String)>;

pub trait RequestSigner: Send + Sync {
    fn sign(&self, method: &str, path: &str, body: &str) -> Result<SignedHeaders, BrokerError>;
}

/// API-key credentials. Debug output never shows the secret or passphrase.
#[derive(Clone)]
pub struct HmacSigner {
    api_key: String,
    api_secret: String,
    passphrase: String,
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("passphrase", &"<redacted>")
            .finish()
    }
}

impl HmacSigner {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            passphrase: passphrase.into(),
        }
    }

    pub fn prehash(path: &str, method: &str, timestamp_ms: i64, nonce: &str, body: &str) -> String {
        format!("{path}{method}{timestamp_ms}{nonce}{body}")
    }

    pub fn signature(&self, prehash: &str) -> Result<String, BrokerError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| BrokerError::Signing(e.to_string()))?;
        mac.update(prehash.as_bytes());
        let digest_hex = hex::encode(mac.finalize().into_bytes());
        Ok(STANDARD.encode(digest_hex.as_bytes()))
    }

    /// Deterministic form of [`RequestSigner::sign`].
    pub fn sign_at(
        &self,
        method: &str,
        path: &str,
        body: &str,
        timestamp_ms: i64,
        nonce: &str,
    ) -> Result<SignedHeaders, BrokerError> {
        let method = method.to_ascii_uppercase();
        let prehash = Self::prehash(path, &method, timestamp_ms, nonce, body);
        let sign = self.signature(&prehash)?;
        Ok(vec![
            (HEADER_KEY, self.api_key.clone()),
            (HEADER_SIGN, sign),
            (HEADER_TIMESTAMP, timestamp_ms.to_string()),
            (HEADER_NONCE, nonce.to_string()),
            (HEADER_PASSPHRASE, self.passphrase.clone()),
        ])
    }
}

impl RequestSigner for HmacSigner {
    fn sign(&self, method: &str, path: &str, body: &str) -> Result<SignedHeaders, BrokerError> {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let nonce = uuid::Uuid::new_v4().to_string();
        self.sign_at(method, path, body, timestamp_ms, &nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header<'a>(h: &'a SignedHeaders, name: &str) -> &'a str {
        h.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
            .unwrap()
    }

    #[test]
    fn prehash_concatenates_in_order() {
        assert_eq!(
            HmacSigner::prehash("/api/v1/trade/orders-pending?limit=20", "GET", 1700000000000, "n-1", ""),
            "/api/v1/trade/orders-pending?limit=20GET1700000000000n-1"
        );
    }

    #[test]
    fn signature_is_base64_of_hex_digest() {
        let s = HmacSigner::new("k", "secret", "pp");
        let sig = s.signature("payload").unwrap();
        let decoded = STANDARD.decode(sig).unwrap();
        assert_eq!(decoded.len(), 64);
        assert!(decoded
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b)));
    }

    #[test]
    fn sign_at_is_deterministic_and_body_sensitive() {
        let s = HmacSigner::new("k", "secret", "pp");
        let a = s.sign_at("get", "/p", "", 1, "n").unwrap();
        let b = s.sign_at("GET", "/p", "", 1, "n").unwrap();
        let c = s.sign_at("GET", "/p", "{}", 1, "n").unwrap();
        assert_eq!(a, b, "method is upper-cased before hashing");
        assert_ne!(header(&a, HEADER_SIGN), header(&c, HEADER_SIGN));
        assert_eq!(header(&a, HEADER_KEY), "k");
        assert_eq!(header(&a, HEADER_PASSPHRASE), "pp");
        assert_eq!(header(&a, HEADER_TIMESTAMP), "1");
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = HmacSigner::new("visible", "hidden-secret", "hidden-pass");
        let dbg = format!("{s:?}");
        assert!(dbg.contains("visible"));
        assert!(!dbg.contains("hidden-secret"));
        assert!(!dbg.contains("hidden-pass"));
    }
}
