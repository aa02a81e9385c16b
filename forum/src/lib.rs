pub mod api;
pub mod config;
pub mod document;
pub mod error;
pub mod ownership;
pub mod paths;
pub mod service;

pub use api::{EndpointRequest, EndpointResponse, Endpoints, Method};
pub use config::{ForumConfig, UploadLimits};
pub use document::{CommentRecord, ImageRef, PostDocument, PostFrontMatter};
pub use error::{ForumError, ForumResult};
pub use ownership::{OwnerToken, OwnershipHash, SiteSecret};
pub use paths::{slugify, CommentPaths, PostPaths};
pub use service::{
    Clock, CommentSubmission, ContentService, ImageUpload, NewPost, PostEdit,
};

pub mod prelude {
    pub use crate::api::*;
    pub use crate::config::*;
    pub use crate::document::*;
    pub use crate::error::*;
    pub use crate::ownership::*;
    pub use crate::paths::*;
    pub use crate::service::*;
}
