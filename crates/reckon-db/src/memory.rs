//! In-process store and resolver.
//!
//! Same contracts as the Postgres implementation: duplicate inserts fail,
//! updates of unknown keys affect 0 rows, selections come back newest first.

use std::collections::{BTreeMap, HashMap};

use anyhow::{bail, Result};
use async_trait::async_trait;
use reckon_model::{
    MappedState, OrderPatch, OrderRecord, Position, PositionKey, PositionSide, RecordKey, RefKey,
    ReferenceTable, RequestPatch, RequestRecord, RequestStatus, StopOrderPatch, StopOrderRecord,
    StopRequestPatch, StopRequestRecord, StopType,
};
use tokio::sync::Mutex;

use crate::{Cursor, CursorStore, RequestFilter, Resolver, StopFilter, Store};

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    requests: BTreeMap<RecordKey, RequestRecord>,
    stop_requests: BTreeMap<(RecordKey, StopType), StopRequestRecord>,
    orders: BTreeMap<u64, OrderRecord>,
    stop_orders: BTreeMap<u64, StopOrderRecord>,
    cursors: HashMap<Cursor, u64>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All requests, keyed order.
    pub async fn requests(&self) -> Vec<RequestRecord> {
        self.tables.lock().await.requests.values().cloned().collect()
    }

    pub async fn stop_requests(&self) -> Vec<StopRequestRecord> {
        self.tables
            .lock()
            .await
            .stop_requests
            .values()
            .cloned()
            .collect()
    }

    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.tables.lock().await.orders.values().cloned().collect()
    }

    pub async fn stop_orders(&self) -> Vec<StopOrderRecord> {
        self.tables
            .lock()
            .await
            .stop_orders
            .values()
            .cloned()
            .collect()
    }
}

fn newest_first<T>(
    mut rows: Vec<T>,
    time: impl Fn(&T) -> chrono::DateTime<chrono::Utc>,
    limit: Option<usize>,
) -> Vec<T> {
    rows.sort_by(|a, b| time(b).cmp(&time(a)));
    if let Some(n) = limit {
        rows.truncate(n);
    }
    rows
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn load_cursor(&self, cursor: Cursor) -> Result<Option<u64>> {
        Ok(self.tables.lock().await.cursors.get(&cursor).copied())
    }

    async fn save_cursor(&self, cursor: Cursor, value: u64) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let stored = tables.cursors.entry(cursor).or_insert(value);
        if value > *stored {
            *stored = value;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn request(&self, key: RecordKey) -> Result<Option<RequestRecord>> {
        Ok(self.tables.lock().await.requests.get(&key).cloned())
    }

    async fn find_requests(&self, filter: &RequestFilter) -> Result<Vec<RequestRecord>> {
        let t = self.tables.lock().await;
        let rows = t
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.update_time, filter.limit))
    }

    async fn insert_request(&self, rec: &RequestRecord) -> Result<u64> {
        let mut t = self.tables.lock().await;
        if t.requests.contains_key(&rec.request) {
            bail!("insert_request failed: duplicate key {}", rec.request);
        }
        t.requests.insert(rec.request, rec.clone());
        Ok(1)
    }

    async fn update_request(&self, key: RecordKey, patch: &RequestPatch) -> Result<u64> {
        let mut t = self.tables.lock().await;
        match t.requests.get_mut(&key) {
            Some(rec) => {
                patch.apply(rec);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
    ) -> Result<Option<StopRequestRecord>> {
        Ok(self
            .tables
            .lock()
            .await
            .stop_requests
            .get(&(key, stop_type))
            .cloned())
    }

    async fn find_stop_requests(&self, filter: &StopFilter) -> Result<Vec<StopRequestRecord>> {
        let t = self.tables.lock().await;
        let rows = t
            .stop_requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        Ok(newest_first(rows, |r| r.update_time, filter.limit))
    }

    async fn insert_stop_request(&self, rec: &StopRequestRecord) -> Result<u64> {
        let mut t = self.tables.lock().await;
        if t.stop_requests.contains_key(&rec.leg()) {
            bail!(
                "insert_stop_request failed: duplicate key {}/{}",
                rec.stop_request,
                rec.stop_type
            );
        }
        t.stop_requests.insert(rec.leg(), rec.clone());
        Ok(1)
    }

    async fn update_stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
        patch: &StopRequestPatch,
    ) -> Result<u64> {
        let mut t = self.tables.lock().await;
        match t.stop_requests.get_mut(&(key, stop_type)) {
            Some(rec) => {
                patch.apply(rec);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn order(&self, order_id: u64) -> Result<Option<OrderRecord>> {
        Ok(self.tables.lock().await.orders.get(&order_id).cloned())
    }

    async fn insert_order(&self, rec: &OrderRecord) -> Result<u64> {
        let mut t = self.tables.lock().await;
        if t.orders.contains_key(&rec.order_id) {
            bail!("insert_order failed: duplicate order_id {}", rec.order_id);
        }
        t.orders.insert(rec.order_id, rec.clone());
        Ok(1)
    }

    async fn update_order(&self, order_id: u64, patch: &OrderPatch) -> Result<u64> {
        let mut t = self.tables.lock().await;
        match t.orders.get_mut(&order_id) {
            Some(rec) => {
                patch.apply(rec);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn stop_order(&self, tpsl_id: u64) -> Result<Option<StopOrderRecord>> {
        Ok(self.tables.lock().await.stop_orders.get(&tpsl_id).cloned())
    }

    async fn insert_stop_order(&self, rec: &StopOrderRecord) -> Result<u64> {
        let mut t = self.tables.lock().await;
        if t.stop_orders.contains_key(&rec.tpsl_id) {
            bail!("insert_stop_order failed: duplicate tpsl_id {}", rec.tpsl_id);
        }
        t.stop_orders.insert(rec.tpsl_id, rec.clone());
        Ok(1)
    }

    async fn update_stop_order(&self, tpsl_id: u64, patch: &StopOrderPatch) -> Result<u64> {
        let mut t = self.tables.lock().await;
        match t.stop_orders.get_mut(&tpsl_id) {
            Some(rec) => {
                patch.apply(rec);
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryResolver
// ---------------------------------------------------------------------------

/// Fixed lookup tables, built up front with the `with_*` methods.
#[derive(Clone, Debug, Default)]
pub struct MemoryResolver {
    references: HashMap<(ReferenceTable, String), RefKey>,
    order_states: HashMap<String, MappedState>,
    positions: Vec<Position>,
    next_key: i64,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self {
            next_key: 1,
            ..Self::default()
        }
    }

    fn allocate(&mut self) -> RefKey {
        let k = RefKey(self.next_key.max(1));
        self.next_key = k.0 + 1;
        k
    }

    pub fn with_reference(mut self, table: ReferenceTable, code: &str) -> Self {
        let key = self.allocate();
        self.references.insert((table, code.to_string()), key);
        self
    }

    pub fn with_order_state(mut self, code: &str, status: RequestStatus) -> Self {
        let state = self.allocate();
        self.order_states
            .insert(code.to_string(), MappedState { state, status });
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.retain(|p| p.key != position.key);
        self.positions.push(position);
        self
    }

    /// Key assigned to `code`, for assertions.
    pub fn reference_key(&self, table: ReferenceTable, code: &str) -> Option<RefKey> {
        self.references.get(&(table, code.to_string())).copied()
    }

    pub fn state_key(&self, code: &str) -> Option<RefKey> {
        self.order_states.get(code).map(|m| m.state)
    }
}

#[async_trait]
impl Resolver for MemoryResolver {
    async fn reference(&self, table: ReferenceTable, code: &str) -> Result<Option<RefKey>> {
        Ok(self.reference_key(table, code))
    }

    async fn order_state(&self, code: &str) -> Result<Option<MappedState>> {
        Ok(self.order_states.get(code).copied())
    }

    async fn position(
        &self,
        account: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<Position>> {
        Ok(self
            .positions
            .iter()
            .find(|p| p.account == account && p.symbol == symbol && p.side == side)
            .cloned())
    }

    async fn position_by_key(&self, key: PositionKey) -> Result<Option<Position>> {
        Ok(self.positions.iter().find(|p| p.key == key).cloned())
    }
}
