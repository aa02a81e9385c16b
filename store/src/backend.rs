use crate::types::{CommitInfo, DirEntry, RunList, TreeEntry};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not found: {path}")]
    NotFound { path: String },

    #[error("Branch '{branch}' moved while the commit was being built")]
    Conflict { branch: String },

    #[error("Invalid commit request: {message}")]
    Validation { message: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Authentication failed")]
    Authentication,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },
}

impl StoreError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Black-box contract of a hosted Git repository.
///
/// Mirrors the subset of a Git data API needed to build commits by hand plus
/// the content and CI queries the forum reads back. `update_ref` is the only
/// compare-and-swap point: it must fail with [`StoreError::Conflict`] when the
/// branch no longer points at `expected`.
#[async_trait]
pub trait GitStore: Send + Sync {
    async fn get_ref(&self, branch: &str) -> StoreResult<String>;

    async fn get_commit(&self, sha: &str) -> StoreResult<CommitInfo>;

    async fn create_blob(&self, content: &[u8]) -> StoreResult<String>;

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> StoreResult<String>;

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> StoreResult<String>;

    async fn update_ref(&self, branch: &str, sha: &str, expected: &str) -> StoreResult<()>;

    /// Raw file bytes at `reference`, or `None` when the path does not exist.
    async fn get_content(&self, path: &str, reference: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Immediate children of a directory. A missing directory is an empty listing.
    async fn list_directory(&self, path: &str, reference: &str) -> StoreResult<Vec<DirEntry>>;

    async fn list_runs_for_commit(&self, sha: &str) -> StoreResult<RunList>;

    /// Public URL serving the raw bytes of `path` on `branch`.
    fn file_url(&self, branch: &str, path: &str) -> String;

    /// Public URL describing a commit.
    fn commit_url(&self, sha: &str) -> String;

    fn store_name(&self) -> &'static str;

    /// UTF-8 content of a file, or `None` when absent.
    async fn get_text(&self, path: &str, reference: &str) -> StoreResult<Option<String>> {
        match self.get_content(path, reference).await? {
            Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|e| {
                StoreError::validation(format!("{} is not valid UTF-8: {}", path, e))
            }),
            None => Ok(None),
        }
    }
}
