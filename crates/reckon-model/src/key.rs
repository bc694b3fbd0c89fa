//! Fixed-width record keys.
//!
//! A request key is the exchange client order id interpreted as hex and
//! left-padded to [`KEY_WIDTH`] bytes. Records the exchange reports without a
//! client id fall back to the broker's numeric order/stop id, encoded the same
//! way, so every record has a stable local key before it is merged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of a record key in bytes (12 hex digits).
pub const KEY_WIDTH: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordKey([u8; KEY_WIDTH]);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyError {
    Empty,
    NotHex(String),
    TooWide(String),
}

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyError::Empty => write!(f, "record key is empty"),
            KeyError::NotHex(raw) => write!(f, "record key '{raw}' is not hex"),
            KeyError::TooWide(raw) => {
                write!(f, "record key '{raw}' exceeds {KEY_WIDTH} bytes")
            }
        }
    }
}

impl std::error::Error for KeyError {}

impl RecordKey {
    pub fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }

    /// Parse an exchange client order id (`0x`-prefixed or bare hex).
    pub fn from_client_order_id(raw: &str) -> Result<Self, KeyError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() {
            return Err(KeyError::Empty);
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(KeyError::NotHex(raw.to_string()));
        }
        if digits.len() > KEY_WIDTH * 2 {
            return Err(KeyError::TooWide(raw.to_string()));
        }

        let padded = format!("{digits:0>width$}", width = KEY_WIDTH * 2);
        let mut out = [0u8; KEY_WIDTH];
        hex::decode_to_slice(&padded, &mut out).map_err(|_| KeyError::NotHex(raw.to_string()))?;
        Ok(Self(out))
    }

    /// Encode a broker numeric id. Ids wider than 48 bits are rejected.
    pub fn from_numeric_id(id: u64) -> Result<Self, KeyError> {
        let be = id.to_be_bytes();
        if be[..8 - KEY_WIDTH].iter().any(|b| *b != 0) {
            return Err(KeyError::TooWide(id.to_string()));
        }
        let mut out = [0u8; KEY_WIDTH];
        out.copy_from_slice(&be[8 - KEY_WIDTH..]);
        Ok(Self(out))
    }

    /// Fresh random key for locally originated intents.
    pub fn generate() -> Self {
        let id = uuid::Uuid::new_v4();
        let mut out = [0u8; KEY_WIDTH];
        out.copy_from_slice(&id.as_bytes()[..KEY_WIDTH]);
        Self(out)
    }

    /// The client order id to send to the exchange.
    pub fn to_client_order_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for RecordKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_client_order_id(s)
    }
}

impl TryFrom<String> for RecordKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_client_order_id(&value)
    }
}

impl From<RecordKey> for String {
    fn from(value: RecordKey) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hex_is_left_padded() {
        let k = RecordKey::from_client_order_id("0xAB").unwrap();
        assert_eq!(k.as_bytes(), &[0, 0, 0, 0, 0, 0xab]);
        assert_eq!(k.to_string(), "0x0000000000ab");
    }

    #[test]
    fn prefix_is_optional_and_case_insensitive() {
        let a = RecordKey::from_client_order_id("0x00ff10").unwrap();
        let b = RecordKey::from_client_order_id("FF10").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn non_hex_and_over_wide_ids_are_rejected() {
        assert!(matches!(
            RecordKey::from_client_order_id("0xZZ"),
            Err(KeyError::NotHex(_))
        ));
        assert!(matches!(
            RecordKey::from_client_order_id("0x1234567890abc"),
            Err(KeyError::TooWide(_))
        ));
        assert_eq!(RecordKey::from_client_order_id("0x"), Err(KeyError::Empty));
    }

    #[test]
    fn numeric_id_matches_equivalent_hex() {
        let a = RecordKey::from_numeric_id(0xab).unwrap();
        let b = RecordKey::from_client_order_id("ab").unwrap();
        assert_eq!(a, b);
        assert!(RecordKey::from_numeric_id(u64::MAX).is_err());
    }

    #[test]
    fn serde_uses_hex_string() {
        let k = RecordKey::from_client_order_id("0x01").unwrap();
        let json = serde_json::to_string(&k).unwrap();
        assert_eq!(json, "\"0x000000000001\"");
        let back: RecordKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, k);
    }
}
