//! Authenticated HTTP client for the analytics API.
//!
//! One network read per call: attach the bearer credential when present,
//! map non-2xx to a typed error, normalize the body, deserialize. Retry is
//! not handled here — the polling cache re-invokes on its interval.

pub mod json;

use crate::cache::{CacheKey, Fetcher};
use crate::normalize::normalize;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Failure of a single fetch, tagged with the resource it was for.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{resource} request returned status {status}")]
    Status { resource: String, status: u16 },
    #[error("{resource} request failed")]
    Transport {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to parse {resource} response")]
    Parse {
        resource: String,
        #[source]
        source: anyhow::Error,
    },
}

impl FetchError {
    /// The short resource name the failed request was for.
    pub fn resource(&self) -> &str {
        match self {
            FetchError::Status { resource, .. }
            | FetchError::Transport { resource, .. }
            | FetchError::Parse { resource, .. } => resource,
        }
    }
}

/// The last path segment, used to tag errors ("/api/analytics" → "analytics").
fn resource_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_owned()
}

/// HTTP client for the pull endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url })
    }

    /// Perform one GET and return the normalized JSON body.
    ///
    /// The `Authorization: Bearer` header is attached only when the key
    /// carries a credential; the analytics endpoint degrades gracefully
    /// without one. The token value itself is never logged.
    pub async fn fetch_json(&self, key: &CacheKey) -> Result<serde_json::Value, FetchError> {
        let resource = resource_name(&key.path);
        let url = format!("{}{}", self.base_url, key.path);

        let mut request = self.http.get(&url);
        if let Some(token) = key.credential.as_deref() {
            request = request.bearer_auth(token);
        }
        debug!(
            resource,
            authorized = key.credential.is_some(),
            "fetching"
        );

        let response = request.send().await.map_err(|e| FetchError::Transport {
            resource: resource.clone(),
            source: e.into(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                resource,
                status: status.as_u16(),
            });
        }

        let body: serde_json::Value =
            response.json().await.map_err(|e| FetchError::Parse {
                resource: resource.clone(),
                source: e.into(),
            })?;

        Ok(normalize(body))
    }
}

#[async_trait]
impl<V: DeserializeOwned + Send> Fetcher<V> for ApiClient {
    async fn fetch(&self, key: &CacheKey) -> Result<V, FetchError> {
        let resource = resource_name(&key.path);
        let body = self.fetch_json(key).await?;
        json::from_value_with_path(body).map_err(|e| FetchError::Parse {
            resource,
            source: e,
        })
    }
}
