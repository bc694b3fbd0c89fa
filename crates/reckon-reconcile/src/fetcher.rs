//! Paginated broker sync.
//!
//! History pages walk forward from the persisted cursor (`before`), pending
//! pages walk from 0 (`after`). Each non-empty page advances the cursor to
//! the page's highest id; history cursors are persisted after every page so a
//! restart resumes where the last pass stopped. An empty page ends the pass.
//!
//! A failed request or the caller's deadline ends the pass early; whatever
//! was collected so far is returned. Passes over the same feed never overlap.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, warn};

use reckon_broker::wire::decode_records;
use reckon_broker::{paths, BrokerClient, PagedRecord, RawOrder, RawStopOrder};
use reckon_db::{Cursor, Store};
use reckon_model::SyncContext;

/// Which exchange book a feed reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Book {
    Orders,
    Stops,
}

/// History walks settled records; pending walks the live book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    History,
    Pending,
}

impl Pass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Pass::History => "history",
            Pass::Pending => "pending",
        }
    }

    fn cursor_param(&self) -> &'static str {
        match self {
            Pass::History => "before",
            Pass::Pending => "after",
        }
    }
}

impl Book {
    pub fn as_str(&self) -> &'static str {
        match self {
            Book::Orders => "orders",
            Book::Stops => "stops",
        }
    }

    pub fn path(&self, pass: Pass) -> &'static str {
        match (self, pass) {
            (Book::Orders, Pass::History) => paths::ORDERS_HISTORY,
            (Book::Orders, Pass::Pending) => paths::ORDERS_PENDING,
            (Book::Stops, Pass::History) => paths::STOPS_HISTORY,
            (Book::Stops, Pass::Pending) => paths::STOPS_PENDING,
        }
    }

    /// Persisted history cursor.
    pub fn cursor(&self) -> Cursor {
        match self {
            Book::Orders => Cursor::AuditOrder,
            Book::Stops => Cursor::AuditStops,
        }
    }
}

/// Wire record type served by a book.
pub trait FeedRecord: DeserializeOwned + PagedRecord + Send + 'static {
    const BOOK: Book;
}

impl FeedRecord for RawOrder {
    const BOOK: Book = Book::Orders;
}

impl FeedRecord for RawStopOrder {
    const BOOK: Book = Book::Stops;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchOutcome<T> {
    pub records: Vec<T>,
    /// Non-empty pages retrieved.
    pub pages: usize,
    /// True when the pass ended on an empty page.
    pub complete: bool,
    /// Why the pass ended early, if it did.
    pub error: Option<String>,
    pub cursor: u64,
}

impl<T> FetchOutcome<T> {
    fn new(cursor: u64) -> Self {
        Self {
            records: Vec::new(),
            pages: 0,
            complete: false,
            error: None,
            cursor,
        }
    }

    /// Nothing was retrieved and the pass did not finish.
    pub fn is_total_failure(&self) -> bool {
        self.pages == 0 && !self.complete
    }
}

struct FeedLocks {
    orders_history: Mutex<()>,
    orders_pending: Mutex<()>,
    stops_history: Mutex<()>,
    stops_pending: Mutex<()>,
}

impl FeedLocks {
    fn new() -> Self {
        Self {
            orders_history: Mutex::new(()),
            orders_pending: Mutex::new(()),
            stops_history: Mutex::new(()),
            stops_pending: Mutex::new(()),
        }
    }

    fn get(&self, book: Book, pass: Pass) -> &Mutex<()> {
        match (book, pass) {
            (Book::Orders, Pass::History) => &self.orders_history,
            (Book::Orders, Pass::Pending) => &self.orders_pending,
            (Book::Stops, Pass::History) => &self.stops_history,
            (Book::Stops, Pass::Pending) => &self.stops_pending,
        }
    }
}

pub struct Fetcher {
    broker: Arc<dyn BrokerClient>,
    cursors: Arc<dyn Store>,
    page_size: u32,
    page_delay: Duration,
    locks: FeedLocks,
}

impl Fetcher {
    pub fn new(broker: Arc<dyn BrokerClient>, cursors: Arc<dyn Store>, ctx: &SyncContext) -> Self {
        Self {
            broker,
            cursors,
            page_size: ctx.page_size.max(1),
            page_delay: ctx.page_delay,
            locks: FeedLocks::new(),
        }
    }

    pub async fn fetch_history<T: FeedRecord>(&self, deadline: Option<Instant>) -> FetchOutcome<T> {
        self.fetch(Pass::History, deadline).await
    }

    pub async fn fetch_pending<T: FeedRecord>(&self, deadline: Option<Instant>) -> FetchOutcome<T> {
        self.fetch(Pass::Pending, deadline).await
    }

    async fn start_cursor(&self, book: Book, pass: Pass) -> u64 {
        if pass == Pass::Pending {
            return 0;
        }
        match self.cursors.load_cursor(book.cursor()).await {
            Ok(v) => v.unwrap_or(0),
            Err(e) => {
                warn!(cursor = book.cursor().as_str(), error = %format!("{e:#}"), "cursor load failed; starting from 0");
                0
            }
        }
    }

    async fn fetch<T: FeedRecord>(&self, pass: Pass, deadline: Option<Instant>) -> FetchOutcome<T> {
        let book = T::BOOK;
        let feed = format!("{}.{}", book.as_str(), pass.as_str());
        let _guard = self.locks.get(book, pass).lock().await;

        let path = book.path(pass);
        let mut out = FetchOutcome::new(self.start_cursor(book, pass).await);

        loop {
            let mut query = Vec::with_capacity(2);
            if pass == Pass::Pending || out.cursor > 0 {
                query.push((pass.cursor_param().to_string(), out.cursor.to_string()));
            }
            query.push(("limit".to_string(), self.page_size.to_string()));

            let request = self.broker.get_page(path, &query);
            let page = match deadline {
                Some(at) => match timeout_at(at, request).await {
                    Ok(page) => page,
                    Err(_) => {
                        warn!(feed = %feed, pages = out.pages, "deadline reached; returning partial batch");
                        out.error = Some("deadline reached".to_string());
                        break;
                    }
                },
                None => request.await,
            };

            let values = match page {
                Ok(values) => values,
                Err(e) => {
                    warn!(feed = %feed, pages = out.pages, error = %e, "page request failed; returning partial batch");
                    out.error = Some(e.to_string());
                    break;
                }
            };
            if values.is_empty() {
                out.complete = true;
                break;
            }

            let (records, bad) = decode_records::<T>(values);
            for reason in &bad {
                warn!(feed = %feed, reason = %reason, "undecodable record skipped");
            }
            let high = records.iter().filter_map(|r| r.page_id()).max();
            out.records.extend(records);
            out.pages += 1;

            match high {
                Some(id) if id > out.cursor => out.cursor = id,
                _ => {
                    // A page that cannot advance the cursor would repeat forever.
                    debug!(feed = %feed, cursor = out.cursor, "cursor did not advance; pass ends");
                    out.complete = true;
                    break;
                }
            }
            if pass == Pass::History {
                if let Err(e) = self.cursors.save_cursor(book.cursor(), out.cursor).await {
                    warn!(feed = %feed, error = %format!("{e:#}"), "cursor save failed");
                }
            }
            debug!(feed = %feed, page = out.pages, cursor = out.cursor, records = out.records.len(), "page fetched");

            let pause = sleep(self.page_delay);
            match deadline {
                Some(at) => {
                    if timeout_at(at, pause).await.is_err() {
                        warn!(feed = %feed, pages = out.pages, "deadline reached; returning partial batch");
                        out.error = Some("deadline reached".to_string());
                        break;
                    }
                }
                None => pause.await,
            }
        }

        out
    }
}
