use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reckon_model::{
    Action, AutoStatus, MappedState, MarginMode, OrderPatch, OrderRecord, Position, PositionKey,
    PositionSide, PositionStatus, RecordKey, RefKey, ReferenceTable, RequestPatch, RequestRecord,
    RequestStatus, StopOrderPatch, StopOrderRecord, StopRequestPatch, StopRequestRecord, StopType,
    KEY_WIDTH,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::{Cursor, CursorStore, RequestFilter, Resolver, StopFilter, Store};

/// Directory row as registered by operators; the key is assigned by the store.
#[derive(Clone, Debug)]
pub struct NewPosition {
    pub account: String,
    pub symbol: String,
    pub side: PositionSide,
    pub auto_status: AutoStatus,
    pub status: PositionStatus,
    pub leverage: u32,
    pub margin_mode: MarginMode,
}

/// Postgres-backed [`Store`] and [`Resolver`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register (or update) an instrument position. Returns its key.
    pub async fn upsert_position(&self, p: &NewPosition) -> Result<PositionKey> {
        let (key,): (i64,) = sqlx::query_as::<_, (i64,)>(
            r#"
            insert into instrument_positions (
              account, symbol, position_side, auto_status, status, leverage, margin_mode
            ) values ($1, $2, $3, $4, $5, $6, $7)
            on conflict (account, symbol, position_side) do update
              set auto_status = excluded.auto_status,
                  status      = excluded.status,
                  leverage    = excluded.leverage,
                  margin_mode = excluded.margin_mode
            returning position_key
            "#,
        )
        .bind(&p.account)
        .bind(&p.symbol)
        .bind(p.side.as_str())
        .bind(p.auto_status.as_str())
        .bind(p.status.as_str())
        .bind(p.leverage as i32)
        .bind(p.margin_mode.as_str())
        .fetch_one(&self.pool)
        .await
        .context("upsert_position failed")?;

        Ok(PositionKey(key))
    }
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

fn key_to_db(key: RecordKey) -> Vec<u8> {
    key.as_bytes().to_vec()
}

fn key_from_db(bytes: Vec<u8>) -> Result<RecordKey> {
    let arr: [u8; KEY_WIDTH] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| anyhow!("stored key has {} bytes, expected {KEY_WIDTH}", bytes.len()))?;
    Ok(RecordKey::from_bytes(arr))
}

fn id_to_db(id: u64) -> Result<i64> {
    i64::try_from(id).with_context(|| format!("id {id} exceeds bigint"))
}

fn id_from_db(v: i64) -> Result<u64> {
    u64::try_from(v).with_context(|| format!("stored id {v} is negative"))
}

fn text<T>(row: &PgRow, col: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    let raw: String = row.try_get(col).with_context(|| format!("decode {col}"))?;
    parse(&raw).ok_or_else(|| anyhow!("unknown {col} value '{raw}'"))
}

fn leverage_from_db(v: i32) -> Result<u32> {
    u32::try_from(v).with_context(|| format!("stored leverage {v} is negative"))
}

const REQUEST_COLUMNS: &str = "request, position_key, action, margin_mode, price, size, leverage, \
     request_type, reduce_only, order_id, state, status, memo, broker_id, \
     create_time, update_time, expiry_time";

fn request_from_row(row: &PgRow) -> Result<RequestRecord> {
    Ok(RequestRecord {
        request: key_from_db(row.try_get("request")?)?,
        position: PositionKey(row.try_get("position_key")?),
        action: text(row, "action", Action::parse)?,
        margin_mode: text(row, "margin_mode", MarginMode::parse)?,
        price: row.try_get("price")?,
        size: row.try_get("size")?,
        leverage: leverage_from_db(row.try_get("leverage")?)?,
        request_type: RefKey(row.try_get("request_type")?),
        reduce_only: row.try_get("reduce_only")?,
        order_id: row
            .try_get::<Option<i64>, _>("order_id")?
            .map(id_from_db)
            .transpose()?,
        state: row.try_get::<Option<i64>, _>("state")?.map(RefKey),
        status: text(row, "status", RequestStatus::parse)?,
        memo: row.try_get("memo")?,
        broker_id: row.try_get("broker_id")?,
        create_time: row.try_get("create_time")?,
        update_time: row.try_get("update_time")?,
        expiry_time: row.try_get("expiry_time")?,
    })
}

const STOP_COLUMNS: &str = "stop_request, stop_type, position_key, action, margin_mode, size, \
     trigger_price, order_price, reduce_only, tpsl_id, state, status, memo, broker_id, \
     create_time, update_time, expiry_time";

fn stop_from_row(row: &PgRow) -> Result<StopRequestRecord> {
    Ok(StopRequestRecord {
        stop_request: key_from_db(row.try_get("stop_request")?)?,
        stop_type: text(row, "stop_type", StopType::parse)?,
        position: PositionKey(row.try_get("position_key")?),
        action: text(row, "action", Action::parse)?,
        margin_mode: text(row, "margin_mode", MarginMode::parse)?,
        size: row.try_get("size")?,
        trigger_price: row.try_get("trigger_price")?,
        order_price: row.try_get("order_price")?,
        reduce_only: row.try_get("reduce_only")?,
        tpsl_id: row
            .try_get::<Option<i64>, _>("tpsl_id")?
            .map(id_from_db)
            .transpose()?,
        state: row.try_get::<Option<i64>, _>("state")?.map(RefKey),
        status: text(row, "status", RequestStatus::parse)?,
        memo: row.try_get("memo")?,
        broker_id: row.try_get("broker_id")?,
        create_time: row.try_get("create_time")?,
        update_time: row.try_get("update_time")?,
        expiry_time: row.try_get("expiry_time")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<OrderRecord> {
    Ok(OrderRecord {
        order_id: id_from_db(row.try_get("order_id")?)?,
        request: key_from_db(row.try_get("request")?)?,
        position: PositionKey(row.try_get("position_key")?),
        order_state: RefKey(row.try_get("order_state")?),
        order_category: RefKey(row.try_get("order_category")?),
        cancel_source: RefKey(row.try_get("cancel_source")?),
        filled_size: row.try_get("filled_size")?,
        filled_amount: row.try_get("filled_amount")?,
        average_price: row.try_get("average_price")?,
        fee: row.try_get("fee")?,
        pnl: row.try_get("pnl")?,
        create_time: row.try_get("create_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn stop_order_from_row(row: &PgRow) -> Result<StopOrderRecord> {
    Ok(StopOrderRecord {
        tpsl_id: id_from_db(row.try_get("tpsl_id")?)?,
        stop_request: key_from_db(row.try_get("stop_request")?)?,
        position: PositionKey(row.try_get("position_key")?),
        order_state: RefKey(row.try_get("order_state")?),
        order_category: RefKey(row.try_get("order_category")?),
        actual_size: row.try_get("actual_size")?,
        create_time: row.try_get("create_time")?,
        update_time: row.try_get("update_time")?,
    })
}

fn position_from_row(row: &PgRow) -> Result<Position> {
    Ok(Position {
        key: PositionKey(row.try_get("position_key")?),
        account: row.try_get("account")?,
        symbol: row.try_get("symbol")?,
        side: text(row, "position_side", PositionSide::parse)?,
        auto_status: text(row, "auto_status", AutoStatus::parse)?,
        status: text(row, "status", PositionStatus::parse)?,
        leverage: leverage_from_db(row.try_get("leverage")?)?,
        margin_mode: text(row, "margin_mode", MarginMode::parse)?,
    })
}

fn status_labels(statuses: &[RequestStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn push_limit(qb: &mut QueryBuilder<'_, Postgres>, limit: Option<usize>) {
    if let Some(n) = limit {
        qb.push(" limit ").push_bind(n as i64);
    }
}

// ---------------------------------------------------------------------------
// Cursor store
// ---------------------------------------------------------------------------

#[async_trait]
impl CursorStore for PgStore {
    async fn load_cursor(&self, cursor: Cursor) -> Result<Option<u64>> {
        let row: Option<(i64,)> =
            sqlx::query_as::<_, (i64,)>("select value from sync_cursors where name = $1")
                .bind(cursor.as_str())
                .fetch_optional(&self.pool)
                .await
                .context("load_cursor failed")?;

        row.map(|(v,)| id_from_db(v)).transpose()
    }

    async fn save_cursor(&self, cursor: Cursor, value: u64) -> Result<()> {
        sqlx::query(
            r#"
            insert into sync_cursors (name, value) values ($1, $2)
            on conflict (name) do update
              set value = excluded.value, updated_at = now()
              where sync_cursors.value < excluded.value
            "#,
        )
        .bind(cursor.as_str())
        .bind(id_to_db(value)?)
        .execute(&self.pool)
        .await
        .context("save_cursor failed")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for PgStore {
    async fn request(&self, key: RecordKey) -> Result<Option<RequestRecord>> {
        let row = sqlx::query(&format!(
            "select {REQUEST_COLUMNS} from requests where request = $1"
        ))
        .bind(key_to_db(key))
        .fetch_optional(&self.pool)
        .await
        .context("fetch request failed")?;

        row.as_ref().map(request_from_row).transpose()
    }

    async fn find_requests(&self, filter: &RequestFilter) -> Result<Vec<RequestRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "select {REQUEST_COLUMNS} from requests where true"
        ));
        if let Some(k) = filter.request {
            qb.push(" and request = ").push_bind(key_to_db(k));
        }
        if let Some(p) = filter.position {
            qb.push(" and position_key = ").push_bind(p.0);
        }
        if !filter.statuses.is_empty() {
            qb.push(" and status = any(")
                .push_bind(status_labels(&filter.statuses))
                .push(")");
        }
        if let Some(t) = filter.expired_before {
            qb.push(" and expiry_time < ").push_bind(t);
        }
        qb.push(" order by update_time desc");
        push_limit(&mut qb, filter.limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("find_requests failed")?;
        rows.iter().map(request_from_row).collect()
    }

    async fn insert_request(&self, rec: &RequestRecord) -> Result<u64> {
        let res = sqlx::query(&format!(
            "insert into requests ({REQUEST_COLUMNS}) values \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(key_to_db(rec.request))
        .bind(rec.position.0)
        .bind(rec.action.as_str())
        .bind(rec.margin_mode.as_str())
        .bind(rec.price)
        .bind(rec.size)
        .bind(rec.leverage as i32)
        .bind(rec.request_type.0)
        .bind(rec.reduce_only)
        .bind(rec.order_id.map(id_to_db).transpose()?)
        .bind(rec.state.map(|s| s.0))
        .bind(rec.status.as_str())
        .bind(&rec.memo)
        .bind(&rec.broker_id)
        .bind(rec.create_time)
        .bind(rec.update_time)
        .bind(rec.expiry_time)
        .execute(&self.pool)
        .await
        .context("insert_request failed")?;

        Ok(res.rows_affected())
    }

    async fn update_request(&self, key: RecordKey, patch: &RequestPatch) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("update requests set ");
        let mut n = 0usize;
        {
            let mut set = qb.separated(", ");
            if let Some(v) = patch.action {
                set.push("action = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.margin_mode {
                set.push("margin_mode = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.price {
                set.push("price = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.size {
                set.push("size = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.leverage {
                set.push("leverage = ").push_bind_unseparated(v as i32);
                n += 1;
            }
            if let Some(v) = patch.request_type {
                set.push("request_type = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.reduce_only {
                set.push("reduce_only = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.order_id {
                set.push("order_id = ").push_bind_unseparated(id_to_db(v)?);
                n += 1;
            }
            if let Some(v) = &patch.broker_id {
                set.push("broker_id = ").push_bind_unseparated(v.clone());
                n += 1;
            }
            if let Some(v) = patch.state {
                set.push("state = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.status {
                set.push("status = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.expiry_time {
                set.push("expiry_time = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = &patch.memo {
                set.push("memo = ").push_bind_unseparated(v.clone());
                n += 1;
            }
            if let Some(v) = patch.update_time {
                set.push("update_time = ").push_bind_unseparated(v);
                n += 1;
            }
        }
        if n == 0 {
            return Ok(0);
        }
        qb.push(" where request = ").push_bind(key_to_db(key));

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_request failed")?;
        Ok(res.rows_affected())
    }

    async fn stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
    ) -> Result<Option<StopRequestRecord>> {
        let row = sqlx::query(&format!(
            "select {STOP_COLUMNS} from stop_requests where stop_request = $1 and stop_type = $2"
        ))
        .bind(key_to_db(key))
        .bind(stop_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("fetch stop_request failed")?;

        row.as_ref().map(stop_from_row).transpose()
    }

    async fn find_stop_requests(&self, filter: &StopFilter) -> Result<Vec<StopRequestRecord>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "select {STOP_COLUMNS} from stop_requests where true"
        ));
        if let Some(k) = filter.stop_request {
            qb.push(" and stop_request = ").push_bind(key_to_db(k));
        }
        if let Some(t) = filter.stop_type {
            qb.push(" and stop_type = ").push_bind(t.as_str());
        }
        if let Some(p) = filter.position {
            qb.push(" and position_key = ").push_bind(p.0);
        }
        if !filter.statuses.is_empty() {
            qb.push(" and status = any(")
                .push_bind(status_labels(&filter.statuses))
                .push(")");
        }
        if let Some(t) = filter.expired_before {
            qb.push(" and expiry_time < ").push_bind(t);
        }
        qb.push(" order by update_time desc");
        push_limit(&mut qb, filter.limit);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("find_stop_requests failed")?;
        rows.iter().map(stop_from_row).collect()
    }

    async fn insert_stop_request(&self, rec: &StopRequestRecord) -> Result<u64> {
        let res = sqlx::query(&format!(
            "insert into stop_requests ({STOP_COLUMNS}) values \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(key_to_db(rec.stop_request))
        .bind(rec.stop_type.as_str())
        .bind(rec.position.0)
        .bind(rec.action.as_str())
        .bind(rec.margin_mode.as_str())
        .bind(rec.size)
        .bind(rec.trigger_price)
        .bind(rec.order_price)
        .bind(rec.reduce_only)
        .bind(rec.tpsl_id.map(id_to_db).transpose()?)
        .bind(rec.state.map(|s| s.0))
        .bind(rec.status.as_str())
        .bind(&rec.memo)
        .bind(&rec.broker_id)
        .bind(rec.create_time)
        .bind(rec.update_time)
        .bind(rec.expiry_time)
        .execute(&self.pool)
        .await
        .context("insert_stop_request failed")?;

        Ok(res.rows_affected())
    }

    async fn update_stop_request(
        &self,
        key: RecordKey,
        stop_type: StopType,
        patch: &StopRequestPatch,
    ) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("update stop_requests set ");
        let mut n = 0usize;
        {
            let mut set = qb.separated(", ");
            if let Some(v) = patch.action {
                set.push("action = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.margin_mode {
                set.push("margin_mode = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.size {
                set.push("size = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.trigger_price {
                set.push("trigger_price = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.order_price {
                set.push("order_price = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.reduce_only {
                set.push("reduce_only = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.tpsl_id {
                set.push("tpsl_id = ").push_bind_unseparated(id_to_db(v)?);
                n += 1;
            }
            if let Some(v) = &patch.broker_id {
                set.push("broker_id = ").push_bind_unseparated(v.clone());
                n += 1;
            }
            if let Some(v) = patch.state {
                set.push("state = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.status {
                set.push("status = ").push_bind_unseparated(v.as_str());
                n += 1;
            }
            if let Some(v) = patch.expiry_time {
                set.push("expiry_time = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = &patch.memo {
                set.push("memo = ").push_bind_unseparated(v.clone());
                n += 1;
            }
            if let Some(v) = patch.update_time {
                set.push("update_time = ").push_bind_unseparated(v);
                n += 1;
            }
        }
        if n == 0 {
            return Ok(0);
        }
        qb.push(" where stop_request = ")
            .push_bind(key_to_db(key))
            .push(" and stop_type = ")
            .push_bind(stop_type.as_str());

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_stop_request failed")?;
        Ok(res.rows_affected())
    }

    async fn order(&self, order_id: u64) -> Result<Option<OrderRecord>> {
        let row = sqlx::query(
            r#"
            select order_id, request, position_key, order_state, order_category, cancel_source,
                   filled_size, filled_amount, average_price, fee, pnl, create_time, update_time
            from orders
            where order_id = $1
            "#,
        )
        .bind(id_to_db(order_id)?)
        .fetch_optional(&self.pool)
        .await
        .context("fetch order failed")?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn insert_order(&self, rec: &OrderRecord) -> Result<u64> {
        let res = sqlx::query(
            r#"
            insert into orders (
              order_id, request, position_key, order_state, order_category, cancel_source,
              filled_size, filled_amount, average_price, fee, pnl, create_time, update_time
            ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(id_to_db(rec.order_id)?)
        .bind(key_to_db(rec.request))
        .bind(rec.position.0)
        .bind(rec.order_state.0)
        .bind(rec.order_category.0)
        .bind(rec.cancel_source.0)
        .bind(rec.filled_size)
        .bind(rec.filled_amount)
        .bind(rec.average_price)
        .bind(rec.fee)
        .bind(rec.pnl)
        .bind(rec.create_time)
        .bind(rec.update_time)
        .execute(&self.pool)
        .await
        .context("insert_order failed")?;

        Ok(res.rows_affected())
    }

    async fn update_order(&self, order_id: u64, patch: &OrderPatch) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("update orders set ");
        let mut n = 0usize;
        {
            let mut set = qb.separated(", ");
            if let Some(v) = patch.order_state {
                set.push("order_state = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.order_category {
                set.push("order_category = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.cancel_source {
                set.push("cancel_source = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.filled_size {
                set.push("filled_size = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.filled_amount {
                set.push("filled_amount = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.average_price {
                set.push("average_price = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.fee {
                set.push("fee = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.pnl {
                set.push("pnl = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.update_time {
                set.push("update_time = ").push_bind_unseparated(v);
                n += 1;
            }
        }
        if n == 0 {
            return Ok(0);
        }
        qb.push(" where order_id = ").push_bind(id_to_db(order_id)?);

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_order failed")?;
        Ok(res.rows_affected())
    }

    async fn stop_order(&self, tpsl_id: u64) -> Result<Option<StopOrderRecord>> {
        let row = sqlx::query(
            r#"
            select tpsl_id, stop_request, position_key, order_state, order_category,
                   actual_size, create_time, update_time
            from stop_orders
            where tpsl_id = $1
            "#,
        )
        .bind(id_to_db(tpsl_id)?)
        .fetch_optional(&self.pool)
        .await
        .context("fetch stop_order failed")?;

        row.as_ref().map(stop_order_from_row).transpose()
    }

    async fn insert_stop_order(&self, rec: &StopOrderRecord) -> Result<u64> {
        let res = sqlx::query(
            r#"
            insert into stop_orders (
              tpsl_id, stop_request, position_key, order_state, order_category,
              actual_size, create_time, update_time
            ) values ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id_to_db(rec.tpsl_id)?)
        .bind(key_to_db(rec.stop_request))
        .bind(rec.position.0)
        .bind(rec.order_state.0)
        .bind(rec.order_category.0)
        .bind(rec.actual_size)
        .bind(rec.create_time)
        .bind(rec.update_time)
        .execute(&self.pool)
        .await
        .context("insert_stop_order failed")?;

        Ok(res.rows_affected())
    }

    async fn update_stop_order(&self, tpsl_id: u64, patch: &StopOrderPatch) -> Result<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("update stop_orders set ");
        let mut n = 0usize;
        {
            let mut set = qb.separated(", ");
            if let Some(v) = patch.order_state {
                set.push("order_state = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.order_category {
                set.push("order_category = ").push_bind_unseparated(v.0);
                n += 1;
            }
            if let Some(v) = patch.actual_size {
                set.push("actual_size = ").push_bind_unseparated(v);
                n += 1;
            }
            if let Some(v) = patch.update_time {
                set.push("update_time = ").push_bind_unseparated(v);
                n += 1;
            }
        }
        if n == 0 {
            return Ok(0);
        }
        qb.push(" where tpsl_id = ").push_bind(id_to_db(tpsl_id)?);

        let res = qb
            .build()
            .execute(&self.pool)
            .await
            .context("update_stop_order failed")?;
        Ok(res.rows_affected())
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

const POSITION_COLUMNS: &str =
    "position_key, account, symbol, position_side, auto_status, status, leverage, margin_mode";

#[async_trait]
impl Resolver for PgStore {
    async fn reference(&self, table: ReferenceTable, code: &str) -> Result<Option<RefKey>> {
        let row: Option<(i64,)> = sqlx::query_as::<_, (i64,)>(
            "select ref_key from reference_codes where ref_table = $1 and source_code = $2",
        )
        .bind(table.as_str())
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("resolve {table} '{code}' failed"))?;

        Ok(row.map(|(k,)| RefKey(k)))
    }

    async fn order_state(&self, code: &str) -> Result<Option<MappedState>> {
        let row: Option<(i64, String)> = sqlx::query_as::<_, (i64, String)>(
            "select state_key, status from order_states where source_code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("resolve order state '{code}' failed"))?;

        row.map(|(k, status)| {
            RequestStatus::parse(&status)
                .map(|status| MappedState {
                    state: RefKey(k),
                    status,
                })
                .ok_or_else(|| anyhow!("order state '{code}' maps to unknown status '{status}'"))
        })
        .transpose()
    }

    async fn position(
        &self,
        account: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(&format!(
            "select {POSITION_COLUMNS} from instrument_positions \
             where account = $1 and symbol = $2 and position_side = $3"
        ))
        .bind(account)
        .bind(symbol)
        .bind(side.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("lookup position failed")?;

        row.as_ref().map(position_from_row).transpose()
    }

    async fn position_by_key(&self, key: PositionKey) -> Result<Option<Position>> {
        let row = sqlx::query(&format!(
            "select {POSITION_COLUMNS} from instrument_positions where position_key = $1"
        ))
        .bind(key.0)
        .fetch_optional(&self.pool)
        .await
        .context("lookup position by key failed")?;

        row.as_ref().map(position_from_row).transpose()
    }
}
