//! Atomic multi-file commits against a [`GitStore`].
//!
//! A [`CommitRequest`] is turned into exactly one commit: read the branch tip,
//! layer a sparse tree over the tip's tree, commit it with the tip as parent,
//! then move the branch with the tip as the expected previous value. If any
//! step fails the branch is left untouched; objects created before the failure
//! are unreachable and harmless.

use crate::backend::{GitStore, StoreError, StoreResult};
use crate::types::{CommitOutcome, CommitRequest, FileContent, FileOperation, TreeEntry};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct CommitBuilder {
    store: Arc<dyn GitStore>,
}

impl CommitBuilder {
    pub fn new(store: Arc<dyn GitStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn GitStore> {
        &self.store
    }

    /// Reject requests the store could apply ambiguously or unsafely.
    pub fn validate(request: &CommitRequest) -> StoreResult<()> {
        if request.branch.trim().is_empty() {
            return Err(StoreError::validation("branch is required"));
        }
        if request.message.trim().is_empty() {
            return Err(StoreError::validation("commit message is required"));
        }
        if request.operations.is_empty() {
            return Err(StoreError::validation("at least one file operation is required"));
        }

        let mut seen = HashSet::new();
        for op in &request.operations {
            validate_path(&op.path)?;
            if !seen.insert(op.path.as_str()) {
                return Err(StoreError::validation(format!(
                    "duplicate operation for path {}",
                    op.path
                )));
            }
        }
        Ok(())
    }

    pub async fn create_commit(&self, request: CommitRequest) -> StoreResult<CommitOutcome> {
        Self::validate(&request)?;
        let branch = request.branch.as_str();

        let tip = self.store.get_ref(branch).await?;
        let base = self.store.get_commit(&tip).await?;
        debug!(branch, tip = %tip, base_tree = %base.tree_sha, "Read branch tip");

        let entries = self.tree_entries(&request.operations).await?;
        let tree = self.store.create_tree(&base.tree_sha, &entries).await?;
        debug!(tree = %tree, entries = entries.len(), "Created tree");

        let commit = self
            .store
            .create_commit(&request.message, &tree, &[tip.clone()])
            .await?;

        if let Err(e) = self.store.update_ref(branch, &commit, &tip).await {
            if e.is_conflict() {
                warn!(branch, tip = %tip, commit = %commit, "Lost ref race; commit discarded");
            }
            return Err(e);
        }

        info!(
            branch,
            commit = %commit,
            operations = request.operations.len(),
            deletions = request.deletions().count(),
            message = %request.message,
            "Committed to {}",
            self.store.store_name()
        );

        Ok(CommitOutcome {
            store_url: self.store.commit_url(&commit),
            commit_id: commit,
        })
    }

    /// Binary payloads become blobs first (uploaded concurrently); text is
    /// inlined; deletions are null-sha entries. Entry order follows the request.
    async fn tree_entries(&self, operations: &[FileOperation]) -> StoreResult<Vec<TreeEntry>> {
        let store = &self.store;
        try_join_all(operations.iter().map(|op| async move {
            let entry = match &op.content {
                Some(FileContent::Binary(bytes)) => {
                    let sha = store.create_blob(bytes).await?;
                    TreeEntry::blob(op.path.clone(), sha)
                }
                Some(FileContent::Text(text)) => TreeEntry::inline(op.path.clone(), text.clone()),
                None => TreeEntry::remove(op.path.clone()),
            };
            Ok::<_, StoreError>(entry)
        }))
        .await
    }
}

fn validate_path(path: &str) -> StoreResult<()> {
    if path.is_empty() {
        return Err(StoreError::validation("empty path"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(StoreError::validation(format!(
            "path must be relative with forward slashes: {}",
            path
        )));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StoreError::validation(format!("invalid path segment in {}", path)));
    }
    Ok(())
}
