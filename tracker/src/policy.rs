//! Which parts of a page to lock while a submission is still in flight.
//!
//! Blocking is advisory. It keeps a user from stacking a second edit on top
//! of one that has not been published yet; the store's compare-and-swap is
//! what actually rejects conflicting writes.

use crate::record::{OperationKind, SubmissionRecord};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::Serialize;

/// The page a tracker is running on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub url: String,
    pub is_edit_page: bool,
    /// Non-empty path segments followed by the `edit` query value, if any.
    identifiers: Vec<String>,
}

impl PageContext {
    /// An edit page carries an `edit` query parameter, with or without a value.
    pub fn parse(url: &str) -> Self {
        let mut is_edit_page = false;
        let mut identifiers = Vec::new();
        if let Ok(parsed) = Url::parse(url) {
            if let Some(segments) = parsed.path_segments() {
                identifiers.extend(
                    segments
                        .filter(|segment| !segment.is_empty())
                        .map(str::to_string),
                );
            }
            for (key, value) in parsed.query_pairs() {
                if key == "edit" {
                    is_edit_page = true;
                    if !value.is_empty() {
                        identifiers.push(value.into_owned());
                    }
                }
            }
        }
        Self {
            url: url.to_string(),
            is_edit_page,
            identifiers,
        }
    }

    /// Whether the page names `resource_id` as a whole path segment or as
    /// the resource being edited.
    pub fn concerns(&self, resource_id: &str) -> bool {
        !resource_id.is_empty() && self.identifiers.iter().any(|id| id == resource_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditConflict {
    Edit,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Restriction {
    DisableNewPostForm,
    DisablePostEditForm { conflict: EditConflict },
    DisablePostActions,
    DisableNewCommentForm,
    DisableCommentActions { comment_id: String },
}

impl Restriction {
    pub fn message(&self) -> &'static str {
        match self {
            Self::DisableNewPostForm => "Post is submitted & backend is processing it...",
            Self::DisablePostEditForm {
                conflict: EditConflict::Edit,
            } => {
                "An edit submission is already in progress for this post. Please wait for it to complete."
            }
            Self::DisablePostEditForm {
                conflict: EditConflict::Delete,
            } => "This post is currently being deleted. Edit is not available.",
            Self::DisablePostActions => "Another change to this post is still being processed.",
            Self::DisableNewCommentForm => "Comment operation is in progress...",
            Self::DisableCommentActions { .. } => {
                "A change to this comment is still being processed."
            }
        }
    }

    /// Replacement text for the blocked form's submit button.
    pub fn progress_text(&self) -> Option<&'static str> {
        match self {
            Self::DisableNewPostForm => Some("Submission in Progress..."),
            Self::DisablePostEditForm {
                conflict: EditConflict::Edit,
            } => Some("Edit in Progress..."),
            Self::DisablePostEditForm {
                conflict: EditConflict::Delete,
            } => Some("Post Being Deleted..."),
            Self::DisableNewCommentForm => Some("Processing..."),
            Self::DisablePostActions | Self::DisableCommentActions { .. } => None,
        }
    }
}

/// The restriction one record imposes on the page, if any.
pub fn restriction_for(record: &SubmissionRecord, page: &PageContext) -> Option<Restriction> {
    if page.url == record.url {
        let restriction = match record.operation {
            OperationKind::NewPost => Restriction::DisableNewPostForm,
            OperationKind::EditPost => Restriction::DisablePostEditForm {
                conflict: EditConflict::Edit,
            },
            OperationKind::DeletePost => Restriction::DisablePostActions,
            OperationKind::NewComment => Restriction::DisableNewCommentForm,
            OperationKind::EditComment | OperationKind::DeleteComment => {
                Restriction::DisableCommentActions {
                    comment_id: record.resource_id.clone(),
                }
            }
        };
        return Some(restriction);
    }

    if page.concerns(&record.resource_id) {
        return Some(if page.is_edit_page {
            Restriction::DisablePostEditForm {
                conflict: EditConflict::Delete,
            }
        } else {
            Restriction::DisablePostActions
        });
    }
    None
}

/// Restrictions from every record, without duplicates, in record order.
pub fn restrictions<'a>(
    records: impl IntoIterator<Item = &'a SubmissionRecord>,
    page: &PageContext,
) -> Vec<Restriction> {
    let mut out: Vec<Restriction> = Vec::new();
    for restriction in records
        .into_iter()
        .filter_map(|record| restriction_for(record, page))
    {
        if !out.contains(&restriction) {
            out.push(restriction);
        }
    }
    out
}

/// Banner describing the oldest in-flight submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotice {
    pub title: String,
    pub description: String,
    pub refresh_after: DateTime<Utc>,
}

impl PendingNotice {
    pub fn for_record(record: &SubmissionRecord, poll_interval: chrono::Duration) -> Self {
        let refresh_after = record.last_activity() + poll_interval;
        let time = refresh_after.format("%H:%M:%S UTC");
        match &record.last_status {
            Some(status) => Self {
                title: format!(
                    "{} operation status at backend is {}",
                    record.operation, status.status
                ),
                description: format!(
                    "Operation lifecycle - pending, queued, in-progress, completed. Refresh the page after {} for an update",
                    time
                ),
                refresh_after,
            },
            None => Self {
                title: format!(
                    "Backend is yet to start processing {} operation",
                    record.operation
                ),
                description: format!("Refresh the page after {} for an update", time),
                refresh_after,
            },
        }
    }
}
