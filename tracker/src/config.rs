use serde::{Deserialize, Serialize};
use std::time::Duration;
use store::config::duration_secs;

pub const DEFAULT_STORAGE_KEY: &str = "activeSubmissions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum gap between two status checks of the same submission.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Submissions older than this are dropped whatever their status.
    #[serde(with = "duration_secs")]
    pub max_wait: Duration,
    pub storage_key: String,
    /// Base URL of the status endpoint; `None` queries the store directly.
    pub status_url: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(10 * 60),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            status_url: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl TrackerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_status_url(mut self, url: impl Into<String>) -> Self {
        self.status_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }
        if self.max_wait < self.poll_interval {
            return Err("max_wait must not be shorter than poll_interval".to_string());
        }
        if self.storage_key.trim().is_empty() {
            return Err("storage_key cannot be empty".to_string());
        }
        if let Some(url) = &self.status_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!(
                    "status_url must start with http:// or https://: {}",
                    url
                ));
            }
        }
        if self.timeout.is_zero() {
            return Err("timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}
