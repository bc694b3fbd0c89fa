//! Import pass: fetch history and pending concurrently, merge history first,
//! then pending, and report one total per feed.

use tokio::time::Instant;
use tracing::info;

use reckon_broker::{RawOrder, RawStopOrder};
use reckon_model::{ReconcileError, ReconcileResult, RequestStatus, ResultState, Source};

use crate::fetcher::{Book, FetchOutcome, Fetcher, Pass};
use crate::publish::Outcome;
use crate::Engine;

/// Outcome counts for one import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedTally {
    /// Inserted or updated.
    pub accepted: usize,
    pub rejected: usize,
    /// Written with status `Expired`.
    pub expired: usize,
    /// Stale, unchanged or superseded within the batch.
    pub noop: usize,
}

impl FeedTally {
    fn count(&mut self, outcome: &Outcome) {
        let r = &outcome.result;
        if !r.success {
            self.rejected += 1;
            return;
        }
        match r.state {
            ResultState::Inserted | ResultState::Updated => {
                self.accepted += 1;
                if outcome.status == Some(RequestStatus::Expired) {
                    self.expired += 1;
                }
            }
            _ => self.noop += 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportReport {
    pub book: Book,
    /// Per-record results, history first, each feed followed by its total.
    pub results: Vec<ReconcileResult>,
    pub tally: FeedTally,
    pub history_complete: bool,
    pub pending_complete: bool,
}

fn total<T>(book: Book, pass: Pass, fetched: &FetchOutcome<T>) -> ReconcileResult {
    let context = format!("{}.{}", book.as_str(), pass.as_str());
    let completeness = if fetched.complete {
        "complete".to_string()
    } else {
        format!(
            "partial: {}",
            fetched.error.as_deref().unwrap_or("ended early")
        )
    };
    ReconcileResult::total(
        &context,
        fetched.records.len(),
        format!(
            "{} records in {} pages; {completeness}",
            fetched.records.len(),
            fetched.pages
        ),
    )
}

impl Engine {
    pub async fn import_orders(
        &self,
        fetcher: &Fetcher,
        deadline: Option<Instant>,
    ) -> Result<ImportReport, ReconcileError> {
        let (history, pending) = tokio::join!(
            fetcher.fetch_history::<RawOrder>(deadline),
            fetcher.fetch_pending::<RawOrder>(deadline),
        );
        check_fetched(Book::Orders, &history, &pending)?;

        let history_totals = total(Book::Orders, Pass::History, &history);
        let pending_totals = total(Book::Orders, Pass::Pending, &pending);
        let (history_complete, pending_complete) = (history.complete, pending.complete);

        let merged_history = self
            .publish_orders_detailed(Source::History, history.records)
            .await;
        let merged_pending = self
            .publish_orders_detailed(Source::Pending, pending.records)
            .await;

        Ok(report(
            Book::Orders,
            (merged_history, history_totals, history_complete),
            (merged_pending, pending_totals, pending_complete),
        ))
    }

    pub async fn import_stops(
        &self,
        fetcher: &Fetcher,
        deadline: Option<Instant>,
    ) -> Result<ImportReport, ReconcileError> {
        let (history, pending) = tokio::join!(
            fetcher.fetch_history::<RawStopOrder>(deadline),
            fetcher.fetch_pending::<RawStopOrder>(deadline),
        );
        check_fetched(Book::Stops, &history, &pending)?;

        let history_totals = total(Book::Stops, Pass::History, &history);
        let pending_totals = total(Book::Stops, Pass::Pending, &pending);
        let (history_complete, pending_complete) = (history.complete, pending.complete);

        let merged_history = self
            .publish_stops_detailed(Source::History, history.records)
            .await;
        let merged_pending = self
            .publish_stops_detailed(Source::Pending, pending.records)
            .await;

        Ok(report(
            Book::Stops,
            (merged_history, history_totals, history_complete),
            (merged_pending, pending_totals, pending_complete),
        ))
    }
}

fn check_fetched<T>(
    book: Book,
    history: &FetchOutcome<T>,
    pending: &FetchOutcome<T>,
) -> Result<(), ReconcileError> {
    if history.is_total_failure() && pending.is_total_failure() {
        return Err(ReconcileError::Broker(format!(
            "{} import retrieved no page: history: {}; pending: {}",
            book.as_str(),
            history.error.as_deref().unwrap_or("ended early"),
            pending.error.as_deref().unwrap_or("ended early"),
        )));
    }
    Ok(())
}

fn report(
    book: Book,
    history: (Vec<Outcome>, ReconcileResult, bool),
    pending: (Vec<Outcome>, ReconcileResult, bool),
) -> ImportReport {
    let mut tally = FeedTally::default();
    let mut results = Vec::with_capacity(history.0.len() + pending.0.len() + 2);

    for (outcomes, totals, _) in [&history, &pending] {
        for o in outcomes {
            tally.count(o);
            results.push(o.result.clone());
        }
        results.push(totals.clone());
    }

    info!(
        book = book.as_str(),
        accepted = tally.accepted,
        rejected = tally.rejected,
        expired = tally.expired,
        noop = tally.noop,
        "import complete"
    );

    ImportReport {
        book,
        results,
        tally,
        history_complete: history.2,
        pending_complete: pending.2,
    }
}
