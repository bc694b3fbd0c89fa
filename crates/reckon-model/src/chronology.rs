//! Chronology guard.
//!
//! An incoming revision is applied only if its update time is strictly newer
//! than the stored one. Equal timestamps are stale, which makes redelivery of
//! the same snapshot idempotent and lets passes arrive out of order safely.

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Newer,
    Stale {
        stored: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

impl Freshness {
    pub fn check(stored: DateTime<Utc>, got: DateTime<Utc>) -> Self {
        if got > stored {
            Freshness::Newer
        } else {
            Freshness::Stale { stored, got }
        }
    }

    pub fn is_newer(&self) -> bool {
        matches!(self, Freshness::Newer)
    }
}

/// Smallest timestamp strictly after `stored` and not before `now`.
///
/// Locally driven transitions (cancel, sweep) stamp `now`, but the stored time
/// may come from an exchange clock running ahead of ours.
pub fn next_after(stored: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let floor = stored + chrono::Duration::milliseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(v: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(v).unwrap()
    }

    #[test]
    fn equal_timestamp_is_stale() {
        assert_eq!(
            Freshness::check(ms(200), ms(200)),
            Freshness::Stale {
                stored: ms(200),
                got: ms(200)
            }
        );
        assert!(!Freshness::check(ms(200), ms(150)).is_newer());
        assert!(Freshness::check(ms(200), ms(201)).is_newer());
    }

    #[test]
    fn next_after_never_goes_backwards() {
        assert_eq!(next_after(ms(100), ms(500)), ms(500));
        assert_eq!(next_after(ms(900), ms(500)), ms(901));
    }
}
