use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Git file mode used for every entry the forum writes.
pub const BLOB_MODE: &str = "100644";

/// Payload of a single file operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// UTF-8 text, embedded directly in the tree entry.
    Text(String),
    /// Arbitrary bytes, uploaded as a blob before the tree is built.
    Binary(Vec<u8>),
}

/// One create/update/delete of a path relative to the repository root.
///
/// `content == None` marks the path for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOperation {
    pub path: String,
    pub content: Option<FileContent>,
}

impl FileOperation {
    pub fn text(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: Some(FileContent::Text(content.into())),
        }
    }

    pub fn binary(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: Some(FileContent::Binary(content.into())),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: None,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.content.is_none()
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.content, Some(FileContent::Binary(_)))
    }
}

/// A batch of file operations that must land in exactly one commit.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub branch: String,
    pub message: String,
    pub operations: Vec<FileOperation>,
}

impl CommitRequest {
    pub fn new(branch: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            message: message.into(),
            operations: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: FileOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_operations(mut self, operations: impl IntoIterator<Item = FileOperation>) -> Self {
        self.operations.extend(operations);
        self
    }

    pub fn deletions(&self) -> impl Iterator<Item = &FileOperation> {
        self.operations.iter().filter(|op| op.is_deletion())
    }
}

/// Result of a successfully applied [`CommitRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub commit_id: String,
    pub store_url: String,
}

/// Object reference inside a tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Existing blob by id.
    Blob(String),
    /// Inline UTF-8 content; the store creates the blob.
    Inline(String),
    /// Null object id; removes the path from the base tree.
    Remove,
}

/// Entry of a sparse tree update applied on top of a base tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub mode: &'static str,
    pub source: EntrySource,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, sha: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE,
            source: EntrySource::Blob(sha.into()),
        }
    }

    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE,
            source: EntrySource::Inline(content.into()),
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE,
            source: EntrySource::Remove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub sha: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

/// One child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// Lifecycle state of a CI run as reported by the hosted API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run has been observed for the commit yet.
    Pending,
    Requested,
    Waiting,
    Queued,
    InProgress,
    ActionRequired,
    Completed,
    Cancelled,
    TimedOut,
    /// The status source itself could not be reached.
    Error,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    /// No further transition is expected from a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Requested => "requested",
            Self::Waiting => "waiting",
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::ActionRequired => "action_required",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub status: RunStatus,
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// CI runs triggered by one commit, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunList {
    pub total_count: u64,
    pub runs: Vec<WorkflowRun>,
}

/// Status of the build triggered by a commit, as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStatus {
    pub status: RunStatus,
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CommitStatus {
    pub fn pending() -> Self {
        Self {
            status: RunStatus::Pending,
            conclusion: None,
            created_at: None,
        }
    }

    /// Reduce a run listing to the latest run, or `pending` when no run exists.
    pub fn from_runs(runs: &RunList) -> Self {
        if runs.total_count == 0 {
            return Self::pending();
        }
        match runs.runs.first() {
            Some(latest) => Self {
                status: latest.status,
                conclusion: latest.conclusion.clone(),
                created_at: latest.created_at,
            },
            None => Self::pending(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
