//! S3-compatible object store backend.
//!
//! Objects live at `{endpoint}/{bucket}/query_cache/{team_id}/{cache_key}`.
//! Object stores have no per-object TTL, so expiry is enforced by the
//! envelope's `expires_at` on read (and by bucket lifecycle rules, if set).
//! Transport errors and 5xx answers are retried with linear backoff.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use vantage_core::{ObjectStoreConfig, StorageError, TeamId, VantageError, VantageResult};

use super::retry::RetryPolicy;
use super::team_key::TeamScopedKey;
use super::traits::{CacheStats, CacheStore, StatsRecorder};

/// Error type for object store operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request failed after {attempts} attempt(s): {reason}")]
    Transport { attempts: usize, reason: String },

    #[error("Unexpected status {status} for {operation}")]
    Status { operation: &'static str, status: u16 },

    #[error("Malformed listing response: {0}")]
    Listing(String),
}

impl From<ObjectStoreError> for VantageError {
    fn from(e: ObjectStoreError) -> Self {
        VantageError::Storage(StorageError::backend("object", e))
    }
}

/// [`CacheStore`] over an S3-like HTTP object store.
pub struct ObjectCacheStore {
    endpoint: String,
    bucket: String,
    bearer_token: Option<SecretString>,
    retry: RetryPolicy,
    client: Client,
    stats: StatsRecorder,
}

impl std::fmt::Debug for ObjectCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectCacheStore")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("authenticated", &self.bearer_token.is_some())
            .field("retry", &self.retry)
            .finish()
    }
}

impl ObjectCacheStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ObjectStoreError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ObjectStoreError::Client(e.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into().trim_matches('/').to_string(),
            bearer_token: None,
            retry: RetryPolicy::default(),
            client,
            stats: StatsRecorder::default(),
        })
    }

    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self, ObjectStoreError> {
        let token = config
            .token
            .as_ref()
            .map(|token| SecretString::from(token.expose_secret().to_owned()));
        Ok(
            Self::new(&config.endpoint, &config.bucket, config.request_timeout())?
                .with_bearer_token(token)
                .with_retry(RetryPolicy {
                    max_attempts: config.max_attempts,
                    base_backoff_ms: config.base_backoff_ms,
                }),
        )
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: Option<SecretString>) -> Self {
        self.bearer_token = token;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn bucket_url(&self) -> String {
        format!("{}/{}", self.endpoint, self.bucket)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}", self.bucket_url(), path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request, retrying transport errors and 5xx answers.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, ObjectStoreError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            match self.authorize(build()).send().await {
                Ok(response)
                    if response.status().is_server_error() && self.retry.allows_retry(attempts) =>
                {
                    tracing::debug!(
                        backend = "object",
                        status = response.status().as_u16(),
                        attempt = attempts,
                        "Retrying object store request"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if self.retry.allows_retry(attempts) => {
                    tracing::debug!(
                        backend = "object",
                        error = %e,
                        attempt = attempts,
                        "Retrying object store request"
                    );
                }
                Err(e) => {
                    return Err(ObjectStoreError::Transport {
                        attempts,
                        reason: e.to_string(),
                    })
                }
            }
            tokio::time::sleep(self.retry.delay_for_attempt(attempts)).await;
        }
    }

    async fn read_inner(&self, key: &TeamScopedKey) -> Result<Option<Vec<u8>>, ObjectStoreError> {
        let url = self.object_url(&key.object_path());
        let response = self.send_with_retry(|| self.client.get(&url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ObjectStoreError::Transport {
                        attempts: 1,
                        reason: e.to_string(),
                    })?;
                Ok(Some(body.to_vec()))
            }
            status => Err(ObjectStoreError::Status {
                operation: "get",
                status: status.as_u16(),
            }),
        }
    }

    async fn write_inner(&self, key: &TeamScopedKey, value: &[u8]) -> Result<(), ObjectStoreError> {
        let url = self.object_url(&key.object_path());
        let response = self
            .send_with_retry(|| {
                self.client
                    .put(&url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(value.to_vec())
            })
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ObjectStoreError::Status {
                operation: "put",
                status: response.status().as_u16(),
            })
        }
    }

    async fn delete_path(&self, path: &str) -> Result<bool, ObjectStoreError> {
        let url = self.object_url(path);
        let response = self.send_with_retry(|| self.client.delete(&url)).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(ObjectStoreError::Status {
                operation: "delete",
                status: status.as_u16(),
            }),
        }
    }

    /// List object paths under `prefix` with ListObjectsV2, following
    /// continuation tokens.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let url = self.bucket_url();
        let mut paths = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let token = continuation.clone();
            let response = self
                .send_with_retry(|| {
                    let mut query = vec![("list-type", "2".to_string()), ("prefix", prefix.to_string())];
                    if let Some(token) = &token {
                        query.push(("continuation-token", token.clone()));
                    }
                    self.client.get(&url).query(&query)
                })
                .await?;
            if !response.status().is_success() {
                return Err(ObjectStoreError::Status {
                    operation: "list",
                    status: response.status().as_u16(),
                });
            }
            let body = response
                .text()
                .await
                .map_err(|e| ObjectStoreError::Listing(e.to_string()))?;
            paths.extend(xml_values(&body, "Key").into_iter().map(str::to_string));

            let truncated = xml_values(&body, "IsTruncated").first() == Some(&"true");
            continuation = xml_values(&body, "NextContinuationToken")
                .first()
                .map(|token| token.to_string());
            if !truncated {
                break;
            }
            if continuation.is_none() {
                return Err(ObjectStoreError::Listing(
                    "truncated listing without continuation token".to_string(),
                ));
            }
        }
        Ok(paths)
    }
}

/// Text content of every `<tag>...</tag>` element, in document order.
fn xml_values<'a>(body: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&open) {
        let after = &rest[start + open.len()..];
        match after.find(&close) {
            Some(end) => {
                values.push(&after[..end]);
                rest = &after[end + close.len()..];
            }
            None => break,
        }
    }
    values
}

#[async_trait]
impl CacheStore for ObjectCacheStore {
    fn name(&self) -> &'static str {
        "object"
    }

    async fn read(&self, key: &TeamScopedKey) -> VantageResult<Option<Vec<u8>>> {
        let result = self.read_inner(key).await.map_err(VantageError::from);
        self.stats.observe_read(&result);
        result
    }

    async fn write(&self, key: &TeamScopedKey, value: &[u8], _ttl: Duration) -> VantageResult<()> {
        match self.write_inner(key, value).await {
            Ok(()) => {
                self.stats.write();
                Ok(())
            }
            Err(e) => {
                self.stats.error();
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &TeamScopedKey) -> VantageResult<bool> {
        Ok(self.delete_path(&key.object_path()).await?)
    }

    async fn invalidate_team(&self, team_id: TeamId) -> VantageResult<u64> {
        let paths = self
            .list_prefix(&TeamScopedKey::object_team_prefix(team_id))
            .await?;
        let mut removed = 0u64;
        for path in &paths {
            if self.delete_path(path).await? {
                removed += 1;
            }
        }
        tracing::info!(backend = "object", team_id = %team_id, removed, "Invalidated team cache");
        Ok(removed)
    }

    async fn ping(&self) -> VantageResult<()> {
        let url = self.bucket_url();
        let response = self.send_with_retry(|| self.client.head(&url)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ObjectStoreError::Status {
                operation: "head bucket",
                status: response.status().as_u16(),
            }
            .into())
        }
    }

    fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }
}
