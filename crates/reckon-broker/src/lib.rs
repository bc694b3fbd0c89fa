//! reckon-broker
//!
//! Exchange REST access for the reconciliation engine: signed paged reads of
//! the order and stop-order feeds, and the wire records they return.
//!
//! The engine only sees [`BrokerClient`]; [`HttpBrokerClient`] is the real
//! implementation and tests substitute scripted fakes.

use std::fmt;

mod client;
mod signer;
pub mod wire;

pub use client::{BrokerClient, HttpBrokerClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
pub use signer::{HmacSigner, RequestSigner, SignedHeaders};
pub use wire::{paths, PagedRecord, RawOrder, RawStopOrder, SubmitAck};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failures talking to the exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// Connection, TLS or request construction failure.
    Transport(String),
    /// The request exceeded the client timeout.
    Timeout,
    /// Non-2xx HTTP status.
    Http { status: u16, body: String },
    /// Exchange envelope carried a non-zero code.
    Api { code: String, msg: String },
    /// Response body was not the expected JSON shape.
    Decode(String),
    /// Request signing failed.
    Signing(String),
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::Transport(msg) => write!(f, "broker transport error: {msg}"),
            BrokerError::Timeout => write!(f, "broker request timed out"),
            BrokerError::Http { status, body } => {
                write!(f, "broker http error status={status} body={body}")
            }
            BrokerError::Api { code, msg } => write!(f, "broker api error code={code} msg={msg}"),
            BrokerError::Decode(msg) => write!(f, "broker response decode failed: {msg}"),
            BrokerError::Signing(msg) => write!(f, "request signing failed: {msg}"),
        }
    }
}

impl std::error::Error for BrokerError {}

impl From<reqwest::Error> for BrokerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BrokerError::Timeout
        } else if e.is_decode() {
            BrokerError::Decode(e.to_string())
        } else {
            BrokerError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_exchange_code() {
        let e = BrokerError::Api {
            code: "152409".into(),
            msg: "signature invalid".into(),
        };
        assert_eq!(
            e.to_string(),
            "broker api error code=152409 msg=signature invalid"
        );
    }

    #[test]
    fn error_display_http() {
        let e = BrokerError::Http {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(e.to_string().contains("status=502"));
    }
}
