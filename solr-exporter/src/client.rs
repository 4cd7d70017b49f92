//! JSON client for the Solr admin and query APIs.

use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use crate::executor::JobError;

/// Core listing endpoint (standalone and cloud).
pub const CORES_STATUS_PATH: &str = "/admin/cores?action=STATUS&wt=json";

/// Collection listing endpoint (cloud only).
pub const COLLECTIONS_LIST_PATH: &str = "/admin/collections?action=LIST&wt=json";

/// Thin wrapper around a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct SolrClient {
    http: reqwest::Client,
    timeout: Duration,
}

impl SolrClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("solr-exporter/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, timeout })
    }

    /// GET `path` relative to `base` and decode the body as JSON.
    pub async fn get_json(&self, base: &str, path: &str) -> Result<Value, JobError> {
        let url = join_url(base, path);
        trace!(url = %url, "Requesting");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| self.transport_error(&url, source))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| self.transport_error(&url, source))?;

        serde_json::from_slice(&body).map_err(|source| JobError::Decode { url, source })
    }

    /// A request that ran out of time is a job timeout like any other.
    fn transport_error(&self, url: &str, source: reqwest::Error) -> JobError {
        if source.is_timeout() {
            JobError::Timeout(self.timeout)
        } else {
            JobError::Transport {
                url: url.to_string(),
                source,
            }
        }
    }

    /// Names of the cores hosted by the node at `base`, sorted.
    pub async fn list_cores(&self, base: &str) -> Result<Vec<String>, JobError> {
        let doc = self.get_json(base, CORES_STATUS_PATH).await?;
        let mut cores: Vec<String> = doc
            .get("status")
            .and_then(Value::as_object)
            .map(|status| status.keys().cloned().collect())
            .unwrap_or_default();
        cores.sort();
        Ok(cores)
    }

    /// Names of the collections of the cluster `base` belongs to, sorted.
    pub async fn list_collections(&self, base: &str) -> Result<Vec<String>, JobError> {
        let doc = self.get_json(base, COLLECTIONS_LIST_PATH).await?;
        let mut collections: Vec<String> = doc
            .get("collections")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        collections.sort();
        Ok(collections)
    }
}

/// Join a base URL and an absolute request path.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
