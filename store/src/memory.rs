//! In-process [`GitStore`] with real compare-and-swap ref semantics.
//!
//! Used by the test suites of every crate in the workspace and by the CLI's
//! `--dry-run` mode. Object ids are SHA-256 digests of the stored objects.

use crate::backend::{GitStore, StoreError, StoreResult};
use crate::types::{CommitInfo, DirEntry, EntryKind, EntrySource, RunList, TreeEntry};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Barrier;
use tracing::debug;

type Tree = BTreeMap<String, String>;

#[derive(Debug, Clone)]
struct StoredCommit {
    tree: String,
    parents: Vec<String>,
    message: String,
}

#[derive(Debug, Default)]
struct State {
    refs: HashMap<String, String>,
    commits: HashMap<String, StoredCommit>,
    trees: HashMap<String, Tree>,
    blobs: HashMap<String, Vec<u8>>,
    runs: HashMap<String, RunList>,
    sequence: u64,
    ref_updates: u64,
}

impl State {
    fn put_blob(&mut self, content: &[u8]) -> String {
        let sha = object_id("blob", content);
        self.blobs.entry(sha.clone()).or_insert_with(|| content.to_vec());
        sha
    }

    fn put_tree(&mut self, tree: Tree) -> String {
        let mut serialized = Vec::new();
        for (path, blob) in &tree {
            serialized.extend_from_slice(path.as_bytes());
            serialized.push(0);
            serialized.extend_from_slice(blob.as_bytes());
            serialized.push(b'\n');
        }
        let sha = object_id("tree", &serialized);
        self.trees.entry(sha.clone()).or_insert(tree);
        sha
    }

    fn put_commit(&mut self, commit: StoredCommit) -> String {
        self.sequence += 1;
        let serialized = format!(
            "{}\n{}\n{}\n{}",
            commit.tree,
            commit.parents.join(" "),
            self.sequence,
            commit.message
        );
        let sha = object_id("commit", serialized.as_bytes());
        self.commits.insert(sha.clone(), commit);
        sha
    }

    /// Branch name or commit id → tree.
    fn resolve_tree(&self, reference: &str) -> StoreResult<&Tree> {
        let commit_sha = self
            .refs
            .get(reference)
            .map(String::as_str)
            .unwrap_or(reference);
        let commit = self
            .commits
            .get(commit_sha)
            .ok_or_else(|| StoreError::not_found(reference))?;
        self.trees
            .get(&commit.tree)
            .ok_or_else(|| StoreError::not_found(commit.tree.clone()))
    }
}

fn object_id(kind: &str, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update(b" ");
    hasher.update(content);
    hex::encode(hasher.finalize())
}

pub struct InMemoryStore {
    state: Mutex<State>,
    update_gate: Option<Arc<Barrier>>,
}

impl InMemoryStore {
    /// A repository whose `branch` points at an empty root commit.
    pub fn new(branch: &str) -> Self {
        let mut state = State::default();
        let tree = state.put_tree(Tree::new());
        let root = state.put_commit(StoredCommit {
            tree,
            parents: Vec::new(),
            message: "Initial commit".to_string(),
        });
        state.refs.insert(branch.to_string(), root);

        Self {
            state: Mutex::new(state),
            update_gate: None,
        }
    }

    /// Every `update_ref` waits on `gate` before comparing the tip, which lets
    /// tests line up concurrent writers deterministically.
    pub fn with_update_gate(mut self, gate: Arc<Barrier>) -> Self {
        self.update_gate = Some(gate);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commits `content` at `path` on every branch without going through
    /// the builder. Does not count as a ref update.
    pub fn seed_file(&self, path: &str, content: Vec<u8>) {
        let mut state = self.state();
        let branches: Vec<(String, String)> = state
            .refs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (branch, tip) in branches {
            let Some(base) = state
                .commits
                .get(&tip)
                .and_then(|c| state.trees.get(&c.tree))
                .cloned()
            else {
                continue;
            };
            let mut tree = base;
            let blob = state.put_blob(&content);
            tree.insert(path.to_string(), blob);
            let tree = state.put_tree(tree);
            let commit = state.put_commit(StoredCommit {
                tree,
                parents: vec![tip],
                message: format!("Seed {}", path),
            });
            state.refs.insert(branch, commit);
        }
    }

    pub fn set_runs(&self, sha: &str, runs: RunList) {
        self.state().runs.insert(sha.to_string(), runs);
    }

    pub fn tip(&self, branch: &str) -> Option<String> {
        self.state().refs.get(branch).cloned()
    }

    pub fn file(&self, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state();
        let tree = state.resolve_tree(branch).ok()?;
        let blob = tree.get(path)?;
        state.blobs.get(blob).cloned()
    }

    pub fn paths(&self, branch: &str) -> Vec<String> {
        let state = self.state();
        state
            .resolve_tree(branch)
            .map(|tree| tree.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of commits reachable from `branch` along first parents.
    pub fn history_len(&self, branch: &str) -> usize {
        let state = self.state();
        let mut count = 0;
        let mut cursor = state.refs.get(branch).cloned();
        while let Some(sha) = cursor {
            count += 1;
            cursor = state
                .commits
                .get(&sha)
                .and_then(|c| c.parents.first().cloned());
        }
        count
    }

    pub fn commit_message(&self, sha: &str) -> Option<String> {
        self.state().commits.get(sha).map(|c| c.message.clone())
    }

    pub fn ref_update_count(&self) -> u64 {
        self.state().ref_updates
    }
}

#[async_trait]
impl GitStore for InMemoryStore {
    async fn get_ref(&self, branch: &str) -> StoreResult<String> {
        self.state()
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("heads/{}", branch)))
    }

    async fn get_commit(&self, sha: &str) -> StoreResult<CommitInfo> {
        let state = self.state();
        let commit = state
            .commits
            .get(sha)
            .ok_or_else(|| StoreError::not_found(sha))?;
        Ok(CommitInfo {
            sha: sha.to_string(),
            tree_sha: commit.tree.clone(),
            parents: commit.parents.clone(),
        })
    }

    async fn create_blob(&self, content: &[u8]) -> StoreResult<String> {
        Ok(self.state().put_blob(content))
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> StoreResult<String> {
        let mut state = self.state();
        let mut tree = state
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| StoreError::not_found(base_tree))?;

        for entry in entries {
            match &entry.source {
                EntrySource::Blob(sha) => {
                    if !state.blobs.contains_key(sha) {
                        return Err(StoreError::validation(format!("unknown blob {}", sha)));
                    }
                    tree.insert(entry.path.clone(), sha.clone());
                }
                EntrySource::Inline(content) => {
                    let sha = state.put_blob(content.as_bytes());
                    tree.insert(entry.path.clone(), sha);
                }
                EntrySource::Remove => {
                    tree.remove(&entry.path);
                }
            }
        }

        Ok(state.put_tree(tree))
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> StoreResult<String> {
        let mut state = self.state();
        if !state.trees.contains_key(tree_sha) {
            return Err(StoreError::not_found(tree_sha));
        }
        if let Some(missing) = parents.iter().find(|p| !state.commits.contains_key(*p)) {
            return Err(StoreError::not_found(missing.clone()));
        }
        Ok(state.put_commit(StoredCommit {
            tree: tree_sha.to_string(),
            parents: parents.to_vec(),
            message: message.to_string(),
        }))
    }

    async fn update_ref(&self, branch: &str, sha: &str, expected: &str) -> StoreResult<()> {
        if let Some(gate) = &self.update_gate {
            gate.wait().await;
        }

        let mut state = self.state();
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("heads/{}", branch)))?;
        if current != expected {
            debug!(branch, expected, current = %current, "Rejecting stale ref update");
            return Err(StoreError::Conflict {
                branch: branch.to_string(),
            });
        }
        if !state.commits.contains_key(sha) {
            return Err(StoreError::not_found(sha));
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        state.ref_updates += 1;
        Ok(())
    }

    async fn get_content(&self, path: &str, reference: &str) -> StoreResult<Option<Vec<u8>>> {
        let state = self.state();
        let tree = state.resolve_tree(reference)?;
        Ok(tree.get(path).and_then(|blob| state.blobs.get(blob)).cloned())
    }

    async fn list_directory(&self, path: &str, reference: &str) -> StoreResult<Vec<DirEntry>> {
        let state = self.state();
        let tree = state.resolve_tree(reference)?;
        let prefix = format!("{}/", path.trim_end_matches('/'));

        let mut files = Vec::new();
        let mut dirs = BTreeSet::new();
        for full in tree.keys() {
            let Some(rest) = full.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => files.push(DirEntry {
                    name: rest.to_string(),
                    path: full.clone(),
                    kind: EntryKind::File,
                }),
            }
        }
        files.extend(dirs.into_iter().map(|name| DirEntry {
            path: format!("{}{}", prefix, name),
            name,
            kind: EntryKind::Dir,
        }));
        Ok(files)
    }

    async fn list_runs_for_commit(&self, sha: &str) -> StoreResult<RunList> {
        Ok(self.state().runs.get(sha).cloned().unwrap_or_default())
    }

    fn file_url(&self, branch: &str, path: &str) -> String {
        format!("memory://{}/{}", branch, path)
    }

    fn commit_url(&self, sha: &str) -> String {
        format!("memory://commit/{}", sha)
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
