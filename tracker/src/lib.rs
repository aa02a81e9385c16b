pub mod config;
pub mod error;
pub mod policy;
pub mod record;
pub mod status;
pub mod storage;
pub mod tracker;

pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use policy::{EditConflict, PageContext, PendingNotice, Restriction};
pub use record::{OperationKind, SubmissionRecord};
pub use status::{HttpStatusSource, StatusSource, StoreStatusSource};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use tracker::{Evaluation, SubmissionTracker, TrackerEvent};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::policy::*;
    pub use crate::record::*;
    pub use crate::status::*;
    pub use crate::storage::*;
    pub use crate::tracker::*;
}
