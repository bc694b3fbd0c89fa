//! Store wrapper with switchable write faults.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use reckon_db::{Cursor, CursorStore, MemoryStore, RequestFilter, StopFilter, Store};
use reckon_model::{
    OrderPatch, OrderRecord, RecordKey, RequestPatch, RequestRecord, StopOrderPatch,
    StopOrderRecord, StopRequestPatch, StopRequestRecord, StopType,
};

/// Delegates to a [`MemoryStore`]; while mirrors are down every order and
/// stop-order write fails.
pub struct FaultStore {
    inner: Arc<MemoryStore>,
    mirrors_down: AtomicBool,
}

impl FaultStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            mirrors_down: AtomicBool::new(false),
        }
    }

    pub fn set_mirrors_down(&self, down: bool) {
        self.mirrors_down.store(down, Ordering::SeqCst);
    }

    fn mirror_write(&self) -> Result<()> {
        if self.mirrors_down.load(Ordering::SeqCst) {
            bail!("mirror write refused: connection reset");
        }
        Ok(())
    }
}

#[async_trait]
impl CursorStore for FaultStore {
    async fn load_cursor(&self, cursor: Cursor) -> Result<Option<u64>> {
        self.inner.load_cursor(cursor).await
    }

    async fn save_cursor(&self, cursor: Cursor, value: u64) -> Result<()> {
        self.inner.save_cursor(cursor, value).await
    }
}

#[async_trait]
impl Store for FaultStore {
    async fn request(&self, key: RecordKey) -> Result<Option<RequestRecord>> {
        self.inner.request(key).await
    }

    async fn find_requests(&self, filter: &RequestFilter) -> Result<Vec<RequestRecord>> {
        self.inner.find_requests(filter).await
    }

    async fn insert_request(&self, rec: &RequestRecord) -> Result<u64> {
        self.inner.insert_request(rec).await
    }

    async fn update_request(&self, key: RecordKey, patch: &RequestPatch) -> Result<u64> {
        self.inner.update_request(key, patch).await
    }

    async fn stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
    ) -> Result<Option<StopRequestRecord>> {
        self.inner.stop_request(key, stop_type).await
    }

    async fn find_stop_requests(&self, filter: &StopFilter) -> Result<Vec<StopRequestRecord>> {
        self.inner.find_stop_requests(filter).await
    }

    async fn insert_stop_request(&self, rec: &StopRequestRecord) -> Result<u64> {
        self.inner.insert_stop_request(rec).await
    }

    async fn update_stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
        patch: &StopRequestPatch,
    ) -> Result<u64> {
        self.inner.update_stop_request(key, stop_type, patch).await
    }

    async fn order(&self, order_id: u64) -> Result<Option<OrderRecord>> {
        self.inner.order(order_id).await
    }

    async fn insert_order(&self, rec: &OrderRecord) -> Result<u64> {
        self.mirror_write()?;
        self.inner.insert_order(rec).await
    }

    async fn update_order(&self, order_id: u64, patch: &OrderPatch) -> Result<u64> {
        self.mirror_write()?;
        self.inner.update_order(order_id, patch).await
    }

    async fn stop_order(&self, tpsl_id: u64) -> Result<Option<StopOrderRecord>> {
        self.inner.stop_order(tpsl_id).await
    }

    async fn insert_stop_order(&self, rec: &StopOrderRecord) -> Result<u64> {
        self.mirror_write()?;
        self.inner.insert_stop_order(rec).await
    }

    async fn update_stop_order(&self, tpsl_id: u64, patch: &StopOrderPatch) -> Result<u64> {
        self.mirror_write()?;
        self.inner.update_stop_order(tpsl_id, patch).await
    }
}
