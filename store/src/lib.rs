pub mod backend;
pub mod commit;
pub mod config;
pub mod github;
pub mod memory;
pub mod types;

pub use backend::{GitStore, StoreError, StoreResult};
pub use commit::CommitBuilder;
pub use config::GitHubConfig;
pub use github::GitHubStore;
pub use memory::InMemoryStore;
pub use types::{
    CommitInfo, CommitOutcome, CommitRequest, CommitStatus, DirEntry, EntryKind, EntrySource,
    FileContent, FileOperation, RunList, RunStatus, TreeEntry, WorkflowRun,
};

pub mod prelude {
    pub use crate::backend::*;
    pub use crate::commit::*;
    pub use crate::config::*;
    pub use crate::github::*;
    pub use crate::memory::*;
    pub use crate::types::*;
}
