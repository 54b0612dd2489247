//! HTTP gateway for a JSONPlaceholder-style REST API.

use super::{Page, RemoteGateway};
use crate::config::RemoteConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use postsync_types::{EntityKind, RecordId};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// REST gateway: `GET/POST /{endpoint}`, `GET/PUT/DELETE /{endpoint}/{id}`
/// and `GET /posts/{id}/comments`.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &RemoteConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: EntityKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }

    fn record_url(&self, kind: EntityKind, id: RecordId) -> String {
        format!("{}/{}/{}", self.base_url, kind.endpoint(), id)
    }
}

async fn send(request: RequestBuilder, what: &str) -> SyncResult<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| SyncError::RemoteUnavailable(format!("{what} failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::RemoteUnavailable(format!(
            "{what} returned HTTP {status}"
        )));
    }
    Ok(response)
}

async fn read_json<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> SyncResult<T> {
    send(request, what)
        .await?
        .json()
        .await
        .map_err(|e| SyncError::RemoteUnavailable(format!("failed to parse {what} response: {e}")))
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn list(&self, kind: EntityKind, page: Option<Page>) -> SyncResult<Vec<Value>> {
        let mut request = self.client.get(self.collection_url(kind));
        if let Some(page) = page {
            request = request.query(&[("_start", page.start), ("_limit", page.limit)]);
        }
        let records: Vec<Value> = read_json(request, &format!("list {kind}")).await?;
        debug!("Fetched {} {} records", records.len(), kind);
        Ok(records)
    }

    async fn get(&self, kind: EntityKind, id: RecordId) -> SyncResult<Value> {
        read_json(
            self.client.get(self.record_url(kind, id)),
            &format!("get {kind} {id}"),
        )
        .await
    }

    async fn create(&self, kind: EntityKind, payload: Value) -> SyncResult<Value> {
        read_json(
            self.client.post(self.collection_url(kind)).json(&payload),
            &format!("create {kind}"),
        )
        .await
    }

    async fn update(&self, kind: EntityKind, id: RecordId, payload: Value) -> SyncResult<Value> {
        read_json(
            self.client.put(self.record_url(kind, id)).json(&payload),
            &format!("update {kind} {id}"),
        )
        .await
    }

    async fn delete(&self, kind: EntityKind, id: RecordId) -> SyncResult<()> {
        send(
            self.client.delete(self.record_url(kind, id)),
            &format!("delete {kind} {id}"),
        )
        .await?;
        Ok(())
    }

    async fn comments_for_post(&self, post_id: RecordId) -> SyncResult<Vec<Value>> {
        let url = format!("{}/comments", self.record_url(EntityKind::Post, post_id));
        read_json(self.client.get(url), &format!("list comments of post {post_id}")).await
    }
}
