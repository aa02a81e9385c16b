//! Where the tracker learns about build progress.

use crate::error::{TrackerError, TrackerResult};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::sync::Arc;
use std::time::Duration;
use store::{CommitStatus, GitStore};
use tracing::debug;

pub const STATUS_PATH: &str = "checkWorkflow";

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, commit_id: &str) -> TrackerResult<CommitStatus>;
}

/// The forum's public `checkWorkflow?sha=` endpoint.
pub struct HttpStatusSource {
    client: Client,
    endpoint: Url,
}

impl HttpStatusSource {
    pub fn new(base_url: &str, timeout: Duration) -> TrackerResult<Self> {
        let endpoint = format!("{}/{}", base_url.trim_end_matches('/'), STATUS_PATH);
        let endpoint = Url::parse(&endpoint).map_err(|e| TrackerError::InvalidConfig {
            message: format!("invalid status URL {}: {}", base_url, e),
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn status(&self, commit_id: &str) -> TrackerResult<CommitStatus> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("sha", commit_id);
        debug!(url = %url, "Checking build status");

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TrackerError::status(format!(
                "HTTP error! status: {}",
                response.status().as_u16()
            )));
        }
        Ok(response.json().await?)
    }
}

/// Reads CI runs straight from the store, for callers holding credentials.
pub struct StoreStatusSource {
    store: Arc<dyn GitStore>,
}

impl StoreStatusSource {
    pub fn new(store: Arc<dyn GitStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StatusSource for StoreStatusSource {
    async fn status(&self, commit_id: &str) -> TrackerResult<CommitStatus> {
        let runs = self
            .store
            .list_runs_for_commit(commit_id)
            .await
            .map_err(|e| TrackerError::status(e.to_string()))?;
        Ok(CommitStatus::from_runs(&runs))
    }
}
