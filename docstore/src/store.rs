use std::sync::Arc;

use async_trait::async_trait;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{Document, FieldWrites, Query, StoreError, WriteBatch};

/// The documents matching a listened query at one point in time.
pub type Snapshot = Vec<Document>;

/// Client interface of a document database.
///
/// Single-document writes default to a one-write batch, so an engine only
/// has to implement `commit` to support every kind of write.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Fetch a document by id. Returns `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create or replace a document.
    async fn set(&self, collection: &str, id: &str, fields: FieldWrites) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.set(collection, id, fields);
        self.commit(batch).await
    }

    /// Merge fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, collection: &str, id: &str, fields: FieldWrites) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.update(collection, id, fields);
        self.commit(batch).await
    }

    /// Delete a document. Succeeds whether or not it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch).await
    }

    /// Run a query and return the matching documents in query order.
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError>;

    /// Count the documents matching a query.
    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        Ok(self.run_query(query).await?.len() as u64)
    }

    /// Apply every write in the batch atomically.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Start listening to a query.
    ///
    /// The stream yields the current result set first and then a new
    /// snapshot after every change. Errors are yielded as items and do not
    /// end the stream.
    async fn listen(&self, query: Query) -> Result<SnapshotStream, StoreError>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        (**self).get(collection, id).await
    }

    async fn set(&self, collection: &str, id: &str, fields: FieldWrites) -> Result<(), StoreError> {
        (**self).set(collection, id, fields).await
    }

    async fn update(&self, collection: &str, id: &str, fields: FieldWrites) -> Result<(), StoreError> {
        (**self).update(collection, id, fields).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        (**self).delete(collection, id).await
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        (**self).run_query(query).await
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        (**self).count(query).await
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        (**self).commit(batch).await
    }

    async fn listen(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        (**self).listen(query).await
    }
}

/// Receiving end of a listened query.
///
/// Dropping the stream stops the task that feeds it.
pub struct SnapshotStream {
    receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
    feeder: JoinHandle<()>,
}

impl SnapshotStream {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Result<Snapshot, StoreError>>,
        feeder: JoinHandle<()>,
    ) -> Self {
        Self { receiver, feeder }
    }

    /// Wait for the next snapshot. Returns `None` once the feeder has stopped.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        self.receiver.recv().await
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.feeder.abort();
    }
}
