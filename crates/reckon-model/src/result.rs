use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable numeric outcome codes.
pub mod codes {
    pub const UPDATED: i32 = 200;
    pub const EXISTS: i32 = 200;
    pub const INSERTED: i32 = 201;
    /// No-op returned by the submission gate.
    pub const SUBMIT_EXISTS: i32 = 201;
    pub const TOTAL: i32 = 203;
    pub const NULL_QUERY: i32 = 400;
    pub const INVALID_ID: i32 = 451;
    pub const UNAUTHORIZED_POSITION: i32 = 452;
    pub const UNRESOLVED_STATE: i32 = 453;
    pub const REQUEST_NOT_FOUND: i32 = 454;
    pub const MALFORMED_REQUEST: i32 = 455;
    pub const SUBMISSION_DENIED: i32 = 456;
    pub const STOP_NOT_FOUND: i32 = 457;
    pub const UNCLASSIFIED: i32 = -1;
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Per-record failure. Every variant maps to a stable code; none of them abort
/// a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    InvalidId(String),
    UnauthorizedPosition(String),
    UnresolvedState(String),
    RequestNotFound(String),
    MalformedRequest(String),
    SubmissionDenied(String),
    StopNotFound(String),
    Store(String),
    Broker(String),
}

impl ReconcileError {
    pub fn code(&self) -> i32 {
        match self {
            ReconcileError::InvalidId(_) => codes::INVALID_ID,
            ReconcileError::UnauthorizedPosition(_) => codes::UNAUTHORIZED_POSITION,
            ReconcileError::UnresolvedState(_) => codes::UNRESOLVED_STATE,
            ReconcileError::RequestNotFound(_) => codes::REQUEST_NOT_FOUND,
            ReconcileError::MalformedRequest(_) => codes::MALFORMED_REQUEST,
            ReconcileError::SubmissionDenied(_) => codes::SUBMISSION_DENIED,
            ReconcileError::StopNotFound(_) => codes::STOP_NOT_FOUND,
            ReconcileError::Store(_) | ReconcileError::Broker(_) => codes::UNCLASSIFIED,
        }
    }

    /// Wrap a store failure, keeping the full context chain.
    pub fn store(err: impl fmt::Display) -> Self {
        ReconcileError::Store(format!("{err:#}"))
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::InvalidId(d) => write!(f, "invalid order id: {d}"),
            ReconcileError::UnauthorizedPosition(d) => {
                write!(f, "unauthorized instrument position: {d}")
            }
            ReconcileError::UnresolvedState(d) => write!(f, "unresolvable order state: {d}"),
            ReconcileError::RequestNotFound(d) => write!(f, "request not found: {d}"),
            ReconcileError::MalformedRequest(d) => write!(f, "malformed request: {d}"),
            ReconcileError::SubmissionDenied(d) => write!(f, "submission denied: {d}"),
            ReconcileError::StopNotFound(d) => write!(f, "stop request not found: {d}"),
            ReconcileError::Store(d) => write!(f, "store failure: {d}"),
            ReconcileError::Broker(d) => write!(f, "broker failure: {d}"),
        }
    }
}

impl std::error::Error for ReconcileError {}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    Inserted,
    Updated,
    Exists,
    NullQuery,
    Error,
    Total,
}

impl ResultState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultState::Inserted => "inserted",
            ResultState::Updated => "updated",
            ResultState::Exists => "exists",
            ResultState::NullQuery => "null_query",
            ResultState::Error => "error",
            ResultState::Total => "total",
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one merge, submit, cancel or ack. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub key: Option<String>,
    pub success: bool,
    pub code: i32,
    pub state: ResultState,
    pub message: String,
    pub rows: u64,
    pub context: String,
}

impl ReconcileResult {
    pub fn inserted(context: &str, key: impl fmt::Display, rows: u64) -> Self {
        Self {
            key: Some(key.to_string()),
            success: true,
            code: codes::INSERTED,
            state: ResultState::Inserted,
            message: "record inserted".to_string(),
            rows,
            context: context.to_string(),
        }
    }

    pub fn updated(context: &str, key: impl fmt::Display, rows: u64) -> Self {
        Self {
            key: Some(key.to_string()),
            success: true,
            code: codes::UPDATED,
            state: ResultState::Updated,
            message: "record updated".to_string(),
            rows,
            context: context.to_string(),
        }
    }

    pub fn exists(
        context: &str,
        key: impl fmt::Display,
        code: i32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            key: Some(key.to_string()),
            success: true,
            code,
            state: ResultState::Exists,
            message: message.into(),
            rows: 0,
            context: context.to_string(),
        }
    }

    pub fn null_query(context: &str, message: impl Into<String>) -> Self {
        Self {
            key: None,
            success: false,
            code: codes::NULL_QUERY,
            state: ResultState::NullQuery,
            message: message.into(),
            rows: 0,
            context: context.to_string(),
        }
    }

    pub fn failure(context: &str, key: Option<String>, err: &ReconcileError) -> Self {
        Self {
            key,
            success: false,
            code: err.code(),
            state: ResultState::Error,
            message: err.to_string(),
            rows: 0,
            context: context.to_string(),
        }
    }

    pub fn total(context: &str, count: usize, message: impl Into<String>) -> Self {
        Self {
            key: None,
            success: true,
            code: codes::TOTAL,
            state: ResultState::Total,
            message: message.into(),
            rows: count as u64,
            context: context.to_string(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_noop(&self) -> bool {
        self.success && self.state == ResultState::Exists
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "context={} key={} success={} code={} state={} rows={} message={}",
            self.context,
            self.key.as_deref().unwrap_or("-"),
            self.success,
            self.code,
            self.state,
            self.rows,
            self.message
        )
    }
}
