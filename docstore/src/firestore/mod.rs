//! Cloud Firestore engine over the REST `v1` API.

mod conversions;
mod firestore_url;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as Json};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use firestore_url::FirestoreURL;

use crate::{Document, DocumentStore, Query, Snapshot, SnapshotStream, StoreError, WriteBatch};

const COUNT_ALIAS: &str = "total";

#[derive(Debug, Clone)]
pub enum Credentials {
    /// OAuth2 access token sent as a bearer token.
    BearerToken(String),
    /// Local emulator; requests are sent without authentication.
    Emulator,
}

#[derive(Debug, Clone)]
pub struct FirestoreOptions {
    pub request_timeout: Duration,
    /// How often listened queries are re-run.
    pub poll_interval: Duration,
}

impl Default for FirestoreOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// [`DocumentStore`] backed by Cloud Firestore (or its emulator).
#[derive(Debug, Clone)]
pub struct FirestoreClient {
    http: Client,
    url: FirestoreURL,
    credentials: Credentials,
    options: FirestoreOptions,
}

impl FirestoreClient {
    pub fn new(
        url: FirestoreURL,
        credentials: Credentials,
        options: FirestoreOptions,
    ) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        Ok(Self {
            http,
            url,
            credentials,
            options,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::BearerToken(token) => {
                request.header(header::AUTHORIZATION, format!("Bearer {}", token))
            }
            Credentials::Emulator => request,
        }
    }

    async fn post<T: DeserializeOwned>(&self, url: String, body: Json) -> Result<T, StoreError> {
        let resp = self
            .authorize(self.http.post(&url))
            .json(&body)
            .send()
            .await?;
        Self::parse(resp).await
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T, StoreError> {
        let status = resp.status();
        if !status.is_success() {
            let body: Json = resp.json().await.unwrap_or(Json::Null);
            let message = body
                .pointer("/error/message")
                .and_then(Json::as_str)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
                .to_string();

            return Err(match status {
                StatusCode::NOT_FOUND => StoreError::NotFound(message),
                StatusCode::SERVICE_UNAVAILABLE => StoreError::Unavailable(message),
                _ => StoreError::Status {
                    code: status.as_u16(),
                    message,
                },
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| StoreError::decode(format!("Failed to parse response as JSON: {}", e)))
    }

    async fn query_now(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let body = json!({ "structuredQuery": conversions::encode_structured_query(query) });
        let response: Json = self.post(self.url.rpc("runQuery"), body).await?;
        conversions::decode_query_response(&response)
    }
}

/// Identity of a snapshot: which documents, at which versions.
fn snapshot_key(snapshot: &Snapshot) -> Vec<(String, time::OffsetDateTime)> {
    snapshot
        .iter()
        .map(|d| (d.id.clone(), d.update_time))
        .collect()
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let resp = self
            .authorize(self.http.get(self.url.document(collection, id)))
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let json: Json = Self::parse(resp).await?;
        conversions::decode_document(&json).map(Some)
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.query_now(query).await
    }

    async fn count(&self, query: &Query) -> Result<u64, StoreError> {
        query.validate()?;
        let body = json!({
            "structuredAggregationQuery": {
                "structuredQuery": conversions::encode_structured_query(query),
                "aggregations": [{ "alias": COUNT_ALIAS, "count": {} }],
            }
        });
        let response: Json = self.post(self.url.rpc("runAggregationQuery"), body).await?;
        conversions::decode_count_response(&response, COUNT_ALIAS)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let writes: Vec<Json> = batch
            .writes()
            .iter()
            .map(|w| conversions::encode_write(w, &self.url))
            .collect();
        debug!(writes = writes.len(), "Committing batch");

        let _: Json = self
            .post(self.url.rpc("commit"), json!({ "writes": writes }))
            .await?;
        Ok(())
    }

    async fn listen(&self, query: Query) -> Result<SnapshotStream, StoreError> {
        query.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.clone();

        let feeder = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(client.options.poll_interval);
            let mut last = None;

            loop {
                ticker.tick().await;

                let item = match client.query_now(&query).await {
                    Ok(snapshot) => {
                        let key = snapshot_key(&snapshot);
                        if last.as_ref() == Some(&key) {
                            continue;
                        }
                        last = Some(key);
                        Ok(snapshot)
                    }
                    Err(e) => {
                        warn!(collection = %query.collection, error = %e, "Listen poll failed");
                        Err(e)
                    }
                };

                if tx.send(item).is_err() {
                    return;
                }
            }
        });

        Ok(SnapshotStream::new(rx, feeder))
    }
}
