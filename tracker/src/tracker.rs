//! Tracks submissions whose commit has not been published yet.
//!
//! A tracker lives for one page session. It restores the in-flight records
//! from storage, tells the page what to lock, and drops records once their
//! build settles or they have waited longer than `max_wait`. Every failure
//! here is logged and swallowed so a broken tracker never blocks a user.

use crate::config::TrackerConfig;
use crate::policy::{restrictions, PageContext, PendingNotice, Restriction};
use crate::record::{OperationKind, SubmissionRecord};
use crate::status::StatusSource;
use crate::storage::KeyValueStorage;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use store::CommitStatus;
use tracing::{debug, info, warn};

/// What the page should do right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub restrictions: Vec<Restriction>,
    pub notice: Option<PendingNotice>,
}

impl Evaluation {
    pub fn is_clear(&self) -> bool {
        self.restrictions.is_empty() && self.notice.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The build reached a terminal state.
    Completed {
        record: SubmissionRecord,
        status: CommitStatus,
    },
    /// Dropped after `max_wait` without a terminal status.
    TimedOut { record: SubmissionRecord },
    PollFailed { commit_id: String, error: String },
}

impl TrackerEvent {
    pub fn message(&self) -> String {
        match self {
            Self::Completed { record, .. } => format!(
                "{} is now complete. Your (updated) post/comment is now live.",
                record.operation
            ),
            Self::TimedOut { record } => format!(
                "{} is taking longer than expected. The page is unlocked; refresh later to see it.",
                record.operation
            ),
            Self::PollFailed { commit_id, error } => {
                format!("Could not check the status of {}: {}", commit_id, error)
            }
        }
    }
}

pub struct SubmissionTracker {
    storage: Arc<dyn KeyValueStorage>,
    source: Arc<dyn StatusSource>,
    config: TrackerConfig,
    page: PageContext,
    records: BTreeMap<String, SubmissionRecord>,
}

impl SubmissionTracker {
    /// Restore persisted records. Unreadable state is discarded.
    pub fn load(
        storage: Arc<dyn KeyValueStorage>,
        source: Arc<dyn StatusSource>,
        config: TrackerConfig,
        page: PageContext,
    ) -> Self {
        let records = match storage.get(&config.storage_key) {
            Ok(Some(text)) => match serde_json::from_str(&text) {
                Ok(records) => records,
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable submission state");
                    BTreeMap::new()
                }
            },
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(error = %e, "Could not read submission state");
                BTreeMap::new()
            }
        };
        debug!(records = records.len(), page = %page.url, "Loaded submission tracker");

        Self {
            storage,
            source,
            config,
            page,
            records,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn set_page(&mut self, page: PageContext) {
        self.page = page;
    }

    pub fn records(&self) -> impl Iterator<Item = &SubmissionRecord> {
        self.records.values()
    }

    pub fn get(&self, commit_id: &str) -> Option<&SubmissionRecord> {
        self.records.get(commit_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Register a submission that was just accepted by the store. A record
    /// with the same commit id is replaced.
    pub fn track(
        &mut self,
        url: &str,
        resource_id: &str,
        operation: OperationKind,
        commit_id: &str,
        now: DateTime<Utc>,
    ) -> Evaluation {
        let record = SubmissionRecord::new(url, resource_id, operation, commit_id, now);
        info!(url, commit = commit_id, operation = %operation, "Tracking submission");
        self.records.insert(commit_id.to_string(), record);
        self.persist();
        self.evaluate()
    }

    pub fn evaluate(&self) -> Evaluation {
        Evaluation {
            restrictions: restrictions(self.records.values(), &self.page),
            notice: self
                .oldest()
                .map(|record| PendingNotice::for_record(record, self.poll_interval())),
        }
    }

    /// Refresh records that are due for a check and drop settled or stale
    /// ones. Never fails.
    pub async fn poll(&mut self, now: DateTime<Utc>) -> Vec<TrackerEvent> {
        let poll_interval = self.poll_interval();
        let max_wait = to_chrono(self.config.max_wait);
        let mut events = Vec::new();
        let mut changed = false;

        let ids: Vec<String> = self.records.keys().cloned().collect();
        for id in ids {
            let Some(record) = self.records.get(&id).cloned() else {
                continue;
            };

            if now - record.last_activity() > poll_interval {
                match self.source.status(&record.commit_id).await {
                    Ok(status) if status.is_terminal() => {
                        info!(commit = %id, status = %status.status, "Submission published");
                        self.records.remove(&id);
                        events.push(TrackerEvent::Completed { record, status });
                        changed = true;
                        continue;
                    }
                    Ok(status) => {
                        debug!(commit = %id, status = %status.status, "Submission still in flight");
                        if let Some(entry) = self.records.get_mut(&id) {
                            entry.last_status = Some(status);
                            entry.last_checked_at = Some(now);
                        }
                        changed = true;
                    }
                    Err(e) => {
                        warn!(commit = %id, error = %e, "Status check failed");
                        events.push(TrackerEvent::PollFailed {
                            commit_id: id.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }

            if now - record.created_at > max_wait {
                warn!(commit = %id, "Submission exceeded max wait, releasing");
                if let Some(record) = self.records.remove(&id) {
                    events.push(TrackerEvent::TimedOut { record });
                }
                changed = true;
            }
        }

        if changed {
            self.persist();
        }
        events
    }

    fn oldest(&self) -> Option<&SubmissionRecord> {
        self.records.values().min_by_key(|record| record.created_at)
    }

    fn poll_interval(&self) -> chrono::Duration {
        to_chrono(self.config.poll_interval)
    }

    fn persist(&self) {
        let key = &self.config.storage_key;
        let result = if self.records.is_empty() {
            self.storage.remove(key)
        } else {
            serde_json::to_string(&self.records)
                .map_err(Into::into)
                .and_then(|text| self.storage.set(key, &text))
        };
        if let Err(e) = result {
            warn!(error = %e, "Could not persist submission state");
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
