use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Trade parameters
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Action::Buy),
            "sell" => Some(Action::Sell),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

impl MarginMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginMode::Cross => "cross",
            MarginMode::Isolated => "isolated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cross" => Some(MarginMode::Cross),
            "isolated" => Some(MarginMode::Isolated),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
    Net,
}

impl PositionSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
            PositionSide::Net => "net",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" => Some(PositionSide::Long),
            "short" => Some(PositionSide::Short),
            "net" => Some(PositionSide::Net),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    #[serde(rename = "tp")]
    TakeProfit,
    #[serde(rename = "sl")]
    StopLoss,
}

impl StopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopType::TakeProfit => "tp",
            StopType::StopLoss => "sl",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tp" => Some(StopType::TakeProfit),
            "sl" => Some(StopType::StopLoss),
            _ => None,
        }
    }
}

impl fmt::Display for StopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Request lifecycle
// ---------------------------------------------------------------------------

/// Local lifecycle label of a request or stop leg.
///
/// `Queued → Pending → (Fulfilled | Rejected | Hold) → (Canceled | Closed | Expired)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestStatus {
    Queued,
    Pending,
    Fulfilled,
    Rejected,
    Hold,
    Canceled,
    Closed,
    Expired,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Queued => "Queued",
            RequestStatus::Pending => "Pending",
            RequestStatus::Fulfilled => "Fulfilled",
            RequestStatus::Rejected => "Rejected",
            RequestStatus::Hold => "Hold",
            RequestStatus::Canceled => "Canceled",
            RequestStatus::Closed => "Closed",
            RequestStatus::Expired => "Expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Queued" => Some(RequestStatus::Queued),
            "Pending" => Some(RequestStatus::Pending),
            "Fulfilled" | "Filled" => Some(RequestStatus::Fulfilled),
            "Rejected" => Some(RequestStatus::Rejected),
            "Hold" => Some(RequestStatus::Hold),
            "Canceled" => Some(RequestStatus::Canceled),
            "Closed" => Some(RequestStatus::Closed),
            "Expired" => Some(RequestStatus::Expired),
            _ => None,
        }
    }

    /// Non-terminal statuses that count toward the single-active-order rule.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RequestStatus::Queued | RequestStatus::Pending | RequestStatus::Hold
        )
    }

    /// Terminal target used by cancellation: a live order is canceled, anything
    /// else is closed.
    pub fn cancel_target(&self) -> RequestStatus {
        match self {
            RequestStatus::Pending => RequestStatus::Canceled,
            _ => RequestStatus::Closed,
        }
    }

    pub const ACTIVE: [RequestStatus; 3] = [
        RequestStatus::Queued,
        RequestStatus::Pending,
        RequestStatus::Hold,
    ];
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Position flags
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoStatus {
    Enabled,
    Disabled,
    Suspended,
}

impl AutoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoStatus::Enabled => "Enabled",
            AutoStatus::Disabled => "Disabled",
            AutoStatus::Suspended => "Suspended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Enabled" => Some(AutoStatus::Enabled),
            "Disabled" => Some(AutoStatus::Disabled),
            "Suspended" => Some(AutoStatus::Suspended),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "Open",
            PositionStatus::Closed => "Closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Open" => Some(PositionStatus::Open),
            "Closed" => Some(PositionStatus::Closed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Merge source
// ---------------------------------------------------------------------------

/// Where an incoming record came from. Lifecycle rules and memos depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Locally originated intent.
    Submit,
    /// Asynchronous push channel.
    Push,
    /// Paged history sync.
    History,
    /// Paged pending sync.
    Pending,
    /// Cancellation coordinator.
    Cancel,
    /// Exchange reply to a submission batch.
    Ack,
    /// Expiry sweep.
    Sweep,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Submit => "submit",
            Source::Push => "push",
            Source::History => "history",
            Source::Pending => "pending",
            Source::Cancel => "cancel",
            Source::Ack => "ack",
            Source::Sweep => "sweep",
        }
    }

    pub fn is_broker_feed(&self) -> bool {
        matches!(self, Source::Push | Source::History | Source::Pending)
    }

    /// Memo stamped on broker-sourced merges.
    pub fn feed_memo(&self) -> Option<&'static str> {
        match self {
            Source::Push => Some("Updated via push"),
            Source::History => Some("Updated via history sync"),
            Source::Pending => Some("Updated via pending sync"),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_labels_round_trip_and_accept_filled_alias() {
        for s in [
            RequestStatus::Queued,
            RequestStatus::Pending,
            RequestStatus::Fulfilled,
            RequestStatus::Rejected,
            RequestStatus::Hold,
            RequestStatus::Canceled,
            RequestStatus::Closed,
            RequestStatus::Expired,
        ] {
            assert_eq!(RequestStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(
            RequestStatus::parse("Filled"),
            Some(RequestStatus::Fulfilled)
        );
    }

    #[test]
    fn only_queued_pending_hold_are_active() {
        let active: Vec<_> = [
            RequestStatus::Queued,
            RequestStatus::Pending,
            RequestStatus::Fulfilled,
            RequestStatus::Rejected,
            RequestStatus::Hold,
            RequestStatus::Canceled,
            RequestStatus::Closed,
            RequestStatus::Expired,
        ]
        .into_iter()
        .filter(|s| s.is_active())
        .collect();
        assert_eq!(active, RequestStatus::ACTIVE.to_vec());
    }

    #[test]
    fn cancel_target_depends_on_liveness() {
        assert_eq!(
            RequestStatus::Pending.cancel_target(),
            RequestStatus::Canceled
        );
        assert_eq!(RequestStatus::Queued.cancel_target(), RequestStatus::Closed);
        assert_eq!(RequestStatus::Hold.cancel_target(), RequestStatus::Closed);
    }
}
