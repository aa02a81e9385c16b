use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use store::CommitStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    NewPost,
    EditPost,
    DeletePost,
    NewComment,
    EditComment,
    DeleteComment,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewPost => "new_post",
            Self::EditPost => "edit_post",
            Self::DeletePost => "delete_post",
            Self::NewComment => "new_comment",
            Self::EditComment => "edit_comment",
            Self::DeleteComment => "delete_comment",
        }
    }

    pub fn is_comment(self) -> bool {
        matches!(self, Self::NewComment | Self::EditComment | Self::DeleteComment)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_post" => Ok(Self::NewPost),
            "edit_post" => Ok(Self::EditPost),
            "delete_post" => Ok(Self::DeletePost),
            "new_comment" => Ok(Self::NewComment),
            "edit_comment" => Ok(Self::EditComment),
            "delete_comment" => Ok(Self::DeleteComment),
            other => Err(format!("unknown operation: {}", other)),
        }
    }
}

/// One in-flight submission, persisted until its build settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    /// Page the submission was made from.
    pub url: String,
    /// Post slug, or comment id for comment operations.
    pub resource_id: String,
    pub operation: OperationKind,
    pub commit_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status: Option<CommitStatus>,
}

impl SubmissionRecord {
    pub fn new(
        url: impl Into<String>,
        resource_id: impl Into<String>,
        operation: OperationKind,
        commit_id: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url: url.into(),
            resource_id: resource_id.into(),
            operation,
            commit_id: commit_id.into(),
            created_at,
            last_checked_at: None,
            last_status: None,
        }
    }

    /// When the record was last looked at, falling back to its creation.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_checked_at.unwrap_or(self.created_at)
    }
}
