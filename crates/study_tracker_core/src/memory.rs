//! crates/study_tracker_core/src/memory.rs
//!
//! An in-process implementation of the `DocumentGateway` port. It keeps every
//! collection in memory and supports change subscriptions, so the router can
//! run (and be tested) without the remote store.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::ports::{
    Clock, Direction, Document, DocumentGateway, DocumentSnapshot, PortError, PortResult, Query,
    WriteBatch, WriteOp,
};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

const CHANGE_CHANNEL_SIZE: usize = 64;

struct MemoryInner {
    collections: Mutex<Collections>,
    changes: broadcast::Sender<String>,
    writes: AtomicUsize,
    offline: AtomicBool,
}

impl MemoryInner {
    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_online(&self) -> PortResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("document store unreachable".to_string()));
        }
        Ok(())
    }

    fn record_write(&self, collection: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine.
        let _ = self.changes.send(collection.to_string());
    }

    fn run_query(&self, query: &Query) -> PortResult<Vec<DocumentSnapshot>> {
        self.check_online()?;
        let collections = self.lock();
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<DocumentSnapshot> = docs
            .iter()
            .filter(|(_, data)| {
                query
                    .filters
                    .iter()
                    .all(|(field, value)| data.get(field) == Some(value))
            })
            .filter(|(_, data)| match &query.order_by {
                Some((field, _)) => data.contains_key(field),
                None => true,
            })
            .map(|(id, data)| DocumentSnapshot {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            matched.sort_by(|a, b| {
                let ord = compare_values(&a.data[field], &b.data[field]);
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        Ok(matched)
    }
}

fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(CmpOrdering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => CmpOrdering::Equal,
    }
}

fn apply(collections: &mut Collections, op: WriteOp) -> PortResult<()> {
    match op {
        WriteOp::Set {
            collection,
            id,
            data,
            merge,
        } => {
            let docs = collections.entry(collection).or_default();
            match docs.get_mut(&id) {
                Some(existing) if merge => existing.extend(data),
                _ => {
                    docs.insert(id, data);
                }
            }
        }
        WriteOp::Update {
            collection,
            id,
            data,
        } => {
            let existing = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| PortError::NotFound(format!("{collection}/{id}")))?;
            existing.extend(data);
        }
        WriteOp::Delete { collection, id } => {
            if let Some(docs) = collections.get_mut(&collection) {
                docs.remove(&id);
            }
        }
    }
    Ok(())
}

fn op_collection(op: &WriteOp) -> &str {
    match op {
        WriteOp::Set { collection, .. }
        | WriteOp::Update { collection, .. }
        | WriteOp::Delete { collection, .. } => collection,
    }
}

/// In-memory document store.
#[derive(Clone)]
pub struct MemoryGateway {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_SIZE);
        Self {
            inner: Arc::new(MemoryInner {
                collections: Mutex::new(BTreeMap::new()),
                changes,
                writes: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// Number of successful write calls (each batch counts once).
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail as if the network were down.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Seeds a document without counting it as a write or notifying subscribers.
    pub fn insert(&self, collection: &str, id: &str, data: Document) {
        self.inner
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
    }

    pub fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.inner
            .lock()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }
}

#[async_trait]
impl DocumentGateway for MemoryGateway {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        self.inner.check_online()?;
        Ok(self.document(collection, id))
    }

    async fn set(&self, collection: &str, id: &str, data: Document, merge: bool) -> PortResult<()> {
        self.inner.check_online()?;
        apply(
            &mut self.inner.lock(),
            WriteOp::Set {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
                merge,
            },
        )?;
        self.inner.record_write(collection);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, data: Document) -> PortResult<()> {
        self.inner.check_online()?;
        apply(
            &mut self.inner.lock(),
            WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            },
        )?;
        self.inner.record_write(collection);
        Ok(())
    }

    async fn add(&self, collection: &str, data: Document) -> PortResult<String> {
        self.inner.check_online()?;
        let id = Uuid::new_v4().simple().to_string();
        self.inner
            .lock()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        self.inner.record_write(collection);
        Ok(id)
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        self.inner.check_online()?;
        apply(
            &mut self.inner.lock(),
            WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )?;
        self.inner.record_write(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> PortResult<Vec<DocumentSnapshot>> {
        self.inner.run_query(query)
    }

    async fn commit(&self, batch: WriteBatch) -> PortResult<()> {
        self.inner.check_online()?;
        let touched: Vec<String> = batch
            .ops
            .iter()
            .map(|op| op_collection(op).to_string())
            .collect();
        {
            let mut collections = self.inner.lock();
            // Apply to a copy first so a failing op leaves nothing behind.
            let mut staged = collections.clone();
            for op in batch.ops {
                apply(&mut staged, op)?;
            }
            *collections = staged;
        }
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        for collection in touched {
            let _ = self.inner.changes.send(collection);
        }
        Ok(())
    }

    fn subscribe(&self, query: Query) -> BoxStream<'static, PortResult<Vec<DocumentSnapshot>>> {
        let inner = self.inner.clone();
        let mut rx = inner.changes.subscribe();
        Box::pin(async_stream::stream! {
            yield inner.run_query(&query);
            loop {
                match rx.recv().await {
                    Ok(collection) if collection == query.collection => {
                        yield inner.run_query(&query);
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(_)) => yield inner.run_query(&query),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(now_ms: i64) -> Self {
        Self(AtomicI64::new(now_ms))
    }

    pub fn advance(&self, ms: i64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let gw = MemoryGateway::new();
        gw.insert("items", "a", doc(json!({ "group": "x", "order": 2 })));
        gw.insert("items", "b", doc(json!({ "group": "x", "order": 1 })));
        gw.insert("items", "c", doc(json!({ "group": "y", "order": 3 })));
        gw.insert("items", "d", doc(json!({ "group": "x" })));

        let q = Query::collection("items")
            .where_eq("group", "x")
            .order_by("order", Direction::Ascending);
        let ids: Vec<String> = gw.query(&q).await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn failing_batch_applies_nothing() {
        let gw = MemoryGateway::new();
        gw.insert("items", "a", doc(json!({ "order": 1 })));

        let mut batch = WriteBatch::new();
        batch.update("items", "a", doc(json!({ "order": 5 })));
        batch.update("items", "missing", doc(json!({ "order": 6 })));
        let err = gw.commit(batch).await.unwrap_err();

        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(gw.document("items", "a").unwrap()["order"], 1);
        assert_eq!(gw.write_count(), 0);
    }

    #[tokio::test]
    async fn merge_set_keeps_existing_fields() {
        let gw = MemoryGateway::new();
        gw.set("users", "u", doc(json!({ "a": 1, "b": 2 })), false).await.unwrap();
        gw.set("users", "u", doc(json!({ "b": 3 })), true).await.unwrap();
        assert_eq!(gw.document("users", "u").unwrap(), doc(json!({ "a": 1, "b": 3 })));
    }

    #[tokio::test]
    async fn subscription_yields_on_collection_changes() {
        let gw = MemoryGateway::new();
        let mut stream = gw.subscribe(Query::collection("userActivity"));
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 0);

        gw.set("other", "x", Document::new(), false).await.unwrap();
        gw.set("userActivity", "u_1", doc(json!({ "userId": "u" })), false)
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn offline_gateway_fails_calls() {
        let gw = MemoryGateway::new();
        gw.set_offline(true);
        assert!(gw.get("users", "u").await.is_err());
        assert!(gw.query(&Query::collection("users")).await.is_err());
    }
}
