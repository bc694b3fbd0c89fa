//! Batch normalizer.
//!
//! A fetched or pushed batch can carry several revisions of the same logical
//! record. Only one per key is merged: orders keep the latest update time,
//! stop orders keep the highest stop id. Ties keep the first arrival.

use std::collections::BTreeMap;

use reckon_broker::{RawOrder, RawStopOrder};
use reckon_model::{RecordKey, ReconcileError};

/// A raw exchange record that can be deduplicated.
pub trait BatchRecord: Clone {
    fn client_id(&self) -> Option<&str>;
    fn numeric_id(&self) -> Option<u64>;
    /// Revisions sharing a key are ranked by this; larger wins.
    fn revision(&self) -> i64;
}

impl BatchRecord for RawOrder {
    fn client_id(&self) -> Option<&str> {
        RawOrder::client_id(self)
    }

    fn numeric_id(&self) -> Option<u64> {
        RawOrder::numeric_id(self)
    }

    fn revision(&self) -> i64 {
        self.updated_at()
            .map(|t| t.timestamp_millis())
            .unwrap_or(i64::MIN)
    }
}

impl BatchRecord for RawStopOrder {
    fn client_id(&self) -> Option<&str> {
        RawStopOrder::client_id(self)
    }

    fn numeric_id(&self) -> Option<u64> {
        RawStopOrder::numeric_id(self)
    }

    fn revision(&self) -> i64 {
        self.numeric_id()
            .and_then(|id| i64::try_from(id).ok())
            .unwrap_or(i64::MIN)
    }
}

/// Local key for a raw record: the client order id when present, else the
/// broker's numeric id.
pub fn logical_key<R: BatchRecord>(rec: &R) -> Result<RecordKey, ReconcileError> {
    if let Some(id) = rec.client_id() {
        return RecordKey::from_client_order_id(id)
            .map_err(|e| ReconcileError::InvalidId(format!("client order id: {e}")));
    }
    match rec.numeric_id() {
        Some(n) => RecordKey::from_numeric_id(n)
            .map_err(|e| ReconcileError::InvalidId(format!("broker id: {e}"))),
        None => Err(ReconcileError::InvalidId(
            "record carries neither a client order id nor a broker id".to_string(),
        )),
    }
}

#[derive(Clone, Debug)]
pub struct Normalized<R> {
    /// One winning revision per key.
    pub records: BTreeMap<RecordKey, R>,
    /// Revisions that lost to a newer one in the same batch.
    pub superseded: Vec<(RecordKey, R)>,
    /// Records with no usable key.
    pub invalid: Vec<(R, ReconcileError)>,
}

pub fn normalize<R: BatchRecord>(batch: Vec<R>) -> Normalized<R> {
    let mut records: BTreeMap<RecordKey, R> = BTreeMap::new();
    let mut superseded = Vec::new();
    let mut invalid = Vec::new();

    for rec in batch {
        let key = match logical_key(&rec) {
            Ok(k) => k,
            Err(e) => {
                invalid.push((rec, e));
                continue;
            }
        };
        match records.get(&key) {
            Some(held) if rec.revision() > held.revision() => {
                if let Some(old) = records.insert(key, rec) {
                    superseded.push((key, old));
                }
            }
            Some(_) => superseded.push((key, rec)),
            None => {
                records.insert(key, rec);
            }
        }
    }

    Normalized {
        records,
        superseded,
        invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(client: &str, id: &str, update_ms: &str, price: &str) -> RawOrder {
        RawOrder {
            client_order_id: Some(client.to_string()),
            order_id: Some(id.to_string()),
            update_time: Some(update_ms.to_string()),
            price: Some(price.to_string()),
            ..RawOrder::default()
        }
    }

    fn stop(client: &str, id: &str) -> RawStopOrder {
        RawStopOrder {
            client_order_id: Some(client.to_string()),
            tpsl_id: Some(id.to_string()),
            ..RawStopOrder::default()
        }
    }

    #[test]
    fn orders_keep_latest_update_time() {
        let n = normalize(vec![
            order("0xab", "1", "200", "12"),
            order("0xab", "1", "300", "13"),
            order("ab", "1", "250", "14"),
        ]);
        assert_eq!(n.records.len(), 1);
        assert_eq!(n.superseded.len(), 2);
        let key = RecordKey::from_client_order_id("0xab").unwrap();
        assert_eq!(n.records[&key].price.as_deref(), Some("13"));
    }

    #[test]
    fn stops_keep_highest_stop_id() {
        let n = normalize(vec![stop("0x0c", "900"), stop("0x0c", "950"), stop("0x0c", "920")]);
        let key = RecordKey::from_client_order_id("0c").unwrap();
        assert_eq!(n.records[&key].tpsl_id.as_deref(), Some("950"));
    }

    #[test]
    fn tie_keeps_first_arrival() {
        let n = normalize(vec![order("0x01", "1", "100", "1"), order("0x01", "1", "100", "2")]);
        let key = RecordKey::from_client_order_id("01").unwrap();
        assert_eq!(n.records[&key].price.as_deref(), Some("1"));
    }

    #[test]
    fn missing_client_id_falls_back_to_broker_id() {
        let rec = RawOrder {
            order_id: Some("4660".into()),
            ..RawOrder::default()
        };
        assert_eq!(
            logical_key(&rec).unwrap(),
            RecordKey::from_client_order_id("0x1234").unwrap()
        );
    }

    #[test]
    fn non_hex_client_id_is_invalid() {
        let n = normalize(vec![order("not-hex", "1", "1", "1")]);
        assert!(n.records.is_empty());
        assert_eq!(n.invalid.len(), 1);
        assert_eq!(n.invalid[0].1.code(), 451);
    }
}
