//! reckon-db
//!
//! Persistence and lookup capabilities consumed by the reconciliation engine:
//!
//! - [`Store`]: typed row access to requests, stop legs, order mirrors and the
//!   persisted sync cursors.
//! - [`Resolver`]: reference codes, exchange order states and the
//!   instrument-position directory behind one narrow interface.
//!
//! [`PgStore`] implements both against Postgres; [`MemoryStore`] and
//! [`MemoryResolver`] are in-process implementations for paper runs and tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reckon_model::{
    MappedState, OrderPatch, OrderRecord, Position, PositionKey, PositionSide, RecordKey, RefKey,
    ReferenceTable, RequestPatch, RequestRecord, RequestStatus, StopOrderPatch, StopOrderRecord,
    StopRequestPatch, StopRequestRecord, StopType,
};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod memory;
mod pg;

pub use memory::{MemoryResolver, MemoryStore};
pub use pg::{NewPosition, PgStore};

pub const ENV_DB_URL: &str = "RECKON_DATABASE_URL";

// ---------------------------------------------------------------------------
// Cursors
// ---------------------------------------------------------------------------

/// Persisted history high-water marks, one per feed. Saves never move a
/// cursor backwards, so concurrent passes cannot rewind each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Cursor {
    AuditOrder,
    AuditStops,
}

impl Cursor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cursor::AuditOrder => "audit_order",
            Cursor::AuditStops => "audit_stops",
        }
    }
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self, cursor: Cursor) -> Result<Option<u64>>;
    async fn save_cursor(&self, cursor: Cursor, value: u64) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Selection over requests. Empty `statuses` matches any status. Results are
/// ordered newest `update_time` first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    pub request: Option<RecordKey>,
    pub position: Option<PositionKey>,
    pub statuses: Vec<RequestStatus>,
    /// Only rows whose `expiry_time` is strictly before this instant.
    pub expired_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RequestFilter {
    pub fn by_key(key: RecordKey) -> Self {
        Self {
            request: Some(key),
            ..Self::default()
        }
    }

    pub fn by_position(position: PositionKey, statuses: &[RequestStatus]) -> Self {
        Self {
            position: Some(position),
            statuses: statuses.to_vec(),
            ..Self::default()
        }
    }

    pub fn matches(&self, rec: &RequestRecord) -> bool {
        self.request.map_or(true, |k| rec.request == k)
            && self.position.map_or(true, |p| rec.position == p)
            && (self.statuses.is_empty() || self.statuses.contains(&rec.status))
            && self.expired_before.map_or(true, |t| rec.expiry_time < t)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopFilter {
    pub stop_request: Option<RecordKey>,
    pub stop_type: Option<StopType>,
    pub position: Option<PositionKey>,
    pub statuses: Vec<RequestStatus>,
    pub expired_before: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl StopFilter {
    pub fn matches(&self, rec: &StopRequestRecord) -> bool {
        self.stop_request.map_or(true, |k| rec.stop_request == k)
            && self.stop_type.map_or(true, |t| rec.stop_type == t)
            && self.position.map_or(true, |p| rec.position == p)
            && (self.statuses.is_empty() || self.statuses.contains(&rec.status))
            && self.expired_before.map_or(true, |t| rec.expiry_time < t)
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Typed row store. Inserts fail on a duplicate key; updates return the number
/// of rows changed (0 when the key is unknown).
#[async_trait]
pub trait Store: CursorStore {
    async fn request(&self, key: RecordKey) -> Result<Option<RequestRecord>>;
    async fn find_requests(&self, filter: &RequestFilter) -> Result<Vec<RequestRecord>>;
    async fn insert_request(&self, rec: &RequestRecord) -> Result<u64>;
    async fn update_request(&self, key: RecordKey, patch: &RequestPatch) -> Result<u64>;

    async fn stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
    ) -> Result<Option<StopRequestRecord>>;
    async fn find_stop_requests(&self, filter: &StopFilter) -> Result<Vec<StopRequestRecord>>;
    async fn insert_stop_request(&self, rec: &StopRequestRecord) -> Result<u64>;
    async fn update_stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
        patch: &StopRequestPatch,
    ) -> Result<u64>;

    async fn order(&self, order_id: u64) -> Result<Option<OrderRecord>>;
    async fn insert_order(&self, rec: &OrderRecord) -> Result<u64>;
    async fn update_order(&self, order_id: u64, patch: &OrderPatch) -> Result<u64>;

    async fn stop_order(&self, tpsl_id: u64) -> Result<Option<StopOrderRecord>>;
    async fn insert_stop_order(&self, rec: &StopOrderRecord) -> Result<u64>;
    async fn update_stop_order(&self, tpsl_id: u64, patch: &StopOrderPatch) -> Result<u64>;
}

/// Side-table lookups: reference codes, order states and positions.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn reference(&self, table: ReferenceTable, code: &str) -> Result<Option<RefKey>>;
    async fn order_state(&self, code: &str) -> Result<Option<MappedState>>;
    async fn position(
        &self,
        account: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<Position>>;
    async fn position_by_key(&self, key: PositionKey) -> Result<Option<Position>>;
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Connect to Postgres using RECKON_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_requests_table: bool,
}

/// Connectivity plus schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='requests'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_requests_table: exists,
    })
}
