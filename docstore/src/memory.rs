//! In-process document store.
//!
//! Behaves like the hosted store for everything the clients rely on:
//! server timestamps, field increments, atomic batches, `in` query limits and
//! live snapshots. Used by tests and by the `memory` backend.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::{
    Document, DocumentStore, FieldValue, FieldWrites, Fields, Query, Snapshot, SnapshotStream,
    StoreError, Value, Write, WriteBatch,
};

type Collection = BTreeMap<String, Document>;

#[derive(Default)]
struct State {
    collections: HashMap<String, Collection>,
    last_commit: Option<OffsetDateTime>,
}

impl State {
    /// Commit time for the next write. Strictly increases across commits.
    fn next_commit_time(&mut self) -> OffsetDateTime {
        let now = OffsetDateTime::now_utc();
        let time = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(time);
        time
    }
}

/// Which operations an injected failure affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Gets, queries, counts and listen evaluations.
    Reads,
    /// Commits, and therefore every single-document write.
    Writes,
    All,
}

impl FailureMode {
    fn covers(self, other: FailureMode) -> bool {
        self == FailureMode::All || self == other
    }
}

struct Inner {
    state: RwLock<State>,
    changes: broadcast::Sender<String>,
    failing: RwLock<HashMap<String, FailureMode>>,
    queries: Mutex<HashMap<String, usize>>,
}

/// In-memory [`DocumentStore`]. Clones share the same data.
///
/// # Examples
///
/// ```
/// use docstore::MemoryStore;
///
/// let store = MemoryStore::new();
/// let shared = store.clone();
/// assert_eq!(shared.query_count("projects"), 0);
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::default()),
                changes,
                failing: RwLock::new(HashMap::new()),
                queries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Make operations touching `collection` fail with
    /// [`StoreError::Unavailable`] until [`MemoryStore::recover`] is called.
    pub fn fail_on(&self, collection: &str, mode: FailureMode) {
        self.inner
            .failing
            .write()
            .unwrap()
            .insert(collection.to_string(), mode);
    }

    pub fn recover(&self, collection: &str) {
        self.inner.failing.write().unwrap().remove(collection);
    }

    /// Number of queries (including counts) run against `collection`.
    pub fn query_count(&self, collection: &str) -> usize {
        self.inner
            .queries
            .lock()
            .unwrap()
            .get(collection)
            .copied()
            .unwrap_or(0)
    }

    pub fn reset_counters(&self) {
        self.inner.queries.lock().unwrap().clear();
    }

    /// Number of documents currently stored in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.inner
            .state
            .read()
            .unwrap()
            .collections
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_available(&self, collection: &str, op: FailureMode) -> Result<(), StoreError> {
        let failing = self.inner.failing.read().unwrap();
        if failing.get(collection).is_some_and(|mode| mode.covers(op)) {
            return Err(StoreError::Unavailable(format!(
                "collection '{}' is unavailable",
                collection
            )));
        }
        Ok(())
    }

    fn record_query(&self, collection: &str) {
        *self
            .inner
            .queries
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default() += 1;
    }

    fn evaluate(&self, query: &Query) -> Result<Snapshot, StoreError> {
        self.check_available(&query.collection, FailureMode::Reads)?;
        query.validate()?;

        let state = self.inner.state.read().unwrap();
        let results = match state.collections.get(&query.collection) {
            Some(collection) => query.apply(collection.values()),
            None => Vec::new(),
        };
        Ok(results)
    }
}

/// Resolve write sentinels against the previous field values.
fn resolve_fields(
    base: Option<&Fields>,
    writes: &FieldWrites,
    commit_time: OffsetDateTime,
) -> Fields {
    let mut fields = base.cloned().unwrap_or_default();
    for (name, write) in writes {
        let value = match write {
            FieldValue::Value(v) => v.clone(),
            FieldValue::ServerTimestamp => Value::Timestamp(commit_time),
            FieldValue::Increment(by) => {
                let current = fields.get(name).and_then(Value::as_i64).unwrap_or(0);
                Value::Integer(current.saturating_add(*by))
            }
        };
        fields.insert(name.clone(), value);
    }
    fields
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available(collection, FailureMode::Reads)?;

        let state = self.inner.state.read().unwrap();
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned())
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.record_query(&query.collection);
        self.evaluate(query)
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        self.record_query(&query.collection);
        Ok(self.evaluate(query)?.len() as u64)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        for write in batch.writes() {
            self.check_available(write.collection(), FailureMode::Writes)?;
        }

        let touched: HashSet<String> = {
            let mut state = self.inner.state.write().unwrap();
            let commit_time = state.next_commit_time();

            // Stage every write against a view of the current documents so a
            // failing write leaves the store untouched.
            let mut staged: HashMap<(String, String), Option<Document>> = HashMap::new();
            for write in batch.writes() {
                let key = (write.collection().to_string(), write.id().to_string());
                let current = match staged.get(&key) {
                    Some(doc) => doc.clone(),
                    None => state
                        .collections
                        .get(write.collection())
                        .and_then(|c| c.get(write.id()))
                        .cloned(),
                };

                let next = match write {
                    Write::Set { id, fields, .. } => Some(Document {
                        id: id.clone(),
                        fields: resolve_fields(None, fields, commit_time),
                        create_time: current.as_ref().map(|d| d.create_time).unwrap_or(commit_time),
                        update_time: commit_time,
                    }),
                    Write::Update {
                        collection,
                        id,
                        fields,
                    } => {
                        let current = current.ok_or_else(|| {
                            StoreError::NotFound(format!("{}/{}", collection, id))
                        })?;
                        Some(Document {
                            fields: resolve_fields(Some(&current.fields), fields, commit_time),
                            update_time: commit_time,
                            ..current
                        })
                    }
                    Write::Delete { .. } => None,
                };
                staged.insert(key, next);
            }

            let mut touched = HashSet::new();
            for ((collection, id), doc) in staged {
                let entries = state.collections.entry(collection.clone()).or_default();
                match doc {
                    Some(doc) => {
                        entries.insert(id, doc);
                    }
                    None => {
                        entries.remove(&id);
                    }
                }
                touched.insert(collection);
            }
            touched
        };

        debug!(writes = batch.len(), "Committed batch");
        for collection in touched {
            // No receivers is fine: nobody is listening.
            let _ = self.inner.changes.send(collection);
        }

        Ok(())
    }

    async fn listen(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        query.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut changes = self.inner.changes.subscribe();
        let store = self.clone();

        let feeder = tokio::spawn(async move {
            let mut last: Option<Snapshot> = None;
            loop {
                match store.evaluate(&query) {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            last = Some(snapshot.clone());
                            if tx.send(Ok(snapshot)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        if tx.send(Err(e)).is_err() {
                            return;
                        }
                    }
                }

                loop {
                    match changes.recv().await {
                        Ok(collection) if collection == query.collection => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(_)) => break,
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        Ok(SnapshotStream::new(rx, feeder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, FilterOp};

    fn fields(pairs: &[(&str, FieldValue)]) -> FieldWrites {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        store
            .set("projects", "p1", fields(&[("name", FieldValue::value("Apollo"))]))
            .await
            .unwrap();

        let doc = store.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(doc.string("name").unwrap(), "Apollo");
        assert!(store.get("projects", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_merges_and_requires_existing_document() {
        let store = MemoryStore::new();
        store
            .set(
                "projects",
                "p1",
                fields(&[
                    ("name", FieldValue::value("Apollo")),
                    ("org", FieldValue::value("NASA")),
                ]),
            )
            .await
            .unwrap();

        store
            .update("projects", "p1", fields(&[("name", FieldValue::value("Gemini"))]))
            .await
            .unwrap();
        let doc = store.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(doc.string("name").unwrap(), "Gemini");
        assert_eq!(doc.string("org").unwrap(), "NASA");

        let err = store
            .update("projects", "nope", fields(&[("name", FieldValue::value("x"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn server_timestamps_strictly_increase() {
        let store = MemoryStore::new();
        let stamp = fields(&[("updatedAt", FieldValue::ServerTimestamp)]);
        store.set("projects", "p1", stamp.clone()).await.unwrap();
        let first = store.get("projects", "p1").await.unwrap().unwrap();
        store.update("projects", "p1", stamp).await.unwrap();
        let second = store.get("projects", "p1").await.unwrap().unwrap();

        assert!(second.timestamp("updatedAt").unwrap() > first.timestamp("updatedAt").unwrap());
        assert_eq!(first.create_time, second.create_time);
    }

    #[tokio::test]
    async fn increment_treats_missing_as_zero() {
        let store = MemoryStore::new();
        store.set("projects", "p1", FieldWrites::new()).await.unwrap();
        for _ in 0..3 {
            store
                .update("projects", "p1", fields(&[("count", FieldValue::Increment(1))]))
                .await
                .unwrap();
        }
        let doc = store.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(doc.integer("count").unwrap(), 3);
    }

    #[tokio::test]
    async fn increment_saturates_at_the_integer_bounds() {
        let store = MemoryStore::new();
        store
            .set("projects", "p1", fields(&[("count", FieldValue::value(i64::MAX))]))
            .await
            .unwrap();

        store
            .update("projects", "p1", fields(&[("count", FieldValue::Increment(1))]))
            .await
            .unwrap();

        let doc = store.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(doc.integer("count").unwrap(), i64::MAX);
    }

    #[tokio::test]
    async fn failed_batch_applies_nothing() {
        let store = MemoryStore::new();
        store
            .set("projects", "p1", fields(&[("count", FieldValue::value(1i64))]))
            .await
            .unwrap();

        let mut batch = WriteBatch::new();
        batch
            .update("projects", "p1", fields(&[("count", FieldValue::value(5i64))]))
            .update("projects", "missing", fields(&[("count", FieldValue::value(5i64))]));
        assert!(store.commit(batch).await.is_err());

        let doc = store.get("projects", "p1").await.unwrap().unwrap();
        assert_eq!(doc.integer("count").unwrap(), 1);
    }

    #[tokio::test]
    async fn queries_are_counted_per_collection() {
        let store = MemoryStore::new();
        let query = Query::collection("sprints").filter("projectId", FilterOp::Equal, "p1");
        store.run_query(&query).await.unwrap();
        store.count(&query).await.unwrap();

        assert_eq!(store.query_count("sprints"), 2);
        assert_eq!(store.query_count("projects"), 0);
    }

    #[tokio::test]
    async fn failing_collection_reports_unavailable() {
        let store = MemoryStore::new();
        store.fail_on("sprints", FailureMode::Reads);
        let query = Query::collection("sprints");
        assert!(matches!(
            store.run_query(&query).await,
            Err(StoreError::Unavailable(_))
        ));

        store.recover("sprints");
        assert!(store.run_query(&query).await.is_ok());
    }

    #[tokio::test]
    async fn write_failures_leave_reads_working() {
        let store = MemoryStore::new();
        store.fail_on("projects", FailureMode::Writes);

        let err = store
            .set("projects", "p1", FieldWrites::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.get("projects", "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listen_yields_initial_and_changed_snapshots() {
        let store = MemoryStore::new();
        store
            .set("projects", "p1", fields(&[("owner", FieldValue::value("u1"))]))
            .await
            .unwrap();

        let query = Query::collection("projects")
            .filter("owner", FilterOp::Equal, "u1")
            .order_by("owner", Direction::Ascending);
        let mut stream = store.listen(query).await.unwrap();

        let initial = stream.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        store
            .set("projects", "p2", fields(&[("owner", FieldValue::value("u1"))]))
            .await
            .unwrap();
        let changed = stream.next().await.unwrap().unwrap();
        assert_eq!(changed.len(), 2);
    }
}
