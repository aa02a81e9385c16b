//! Post and comment lifecycle on top of the git store.
//!
//! Each mutating operation reads what it needs, checks ownership, assembles
//! the full set of file changes and hands them to the [`CommitBuilder`] as a
//! single commit. Nothing is written when a check fails.

use crate::config::UploadLimits;
use crate::document::{
    CommentRecord, ImageRef, PostDocument, PostFrontMatter, DEFAULT_AUTHOR, POST_LAYOUT,
};
use crate::error::{ForumError, ForumResult};
use crate::ownership::{OwnerToken, SiteSecret};
use crate::paths::{
    slugify, validate_segment, CommentPaths, PostPaths, COMMENT_IMAGE_PREFIX, POST_DOCUMENT,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use store::{
    CommitBuilder, CommitOutcome, CommitRequest, CommitStatus, DirEntry, FileOperation, GitStore,
};
use tracing::{debug, info, warn};

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// An uploaded file as received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    fn validate(&self, max_bytes: usize) -> ForumResult<()> {
        validate_segment("image name", &self.file_name)?;
        if !self.mime_type.starts_with("image/") {
            return Err(ForumError::validation(format!(
                "Only image uploads are allowed: {} is {}",
                self.file_name, self.mime_type
            )));
        }
        if self.bytes.len() > max_bytes {
            return Err(ForumError::validation(format!(
                "Image {} exceeds the {} byte limit",
                self.file_name, max_bytes
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Clone, Default)]
pub struct PostEdit {
    pub slug: String,
    pub date: String,
    pub title: String,
    pub body: String,
    pub new_images: Vec<ImageUpload>,
    pub deleted_images: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentSubmission {
    pub post_slug: String,
    pub post_date: String,
    pub text: String,
    pub comment_id: Option<String>,
    pub image: Option<ImageUpload>,
}

pub struct ContentService {
    store: Arc<dyn GitStore>,
    builder: CommitBuilder,
    branch: String,
    secret: SiteSecret,
    limits: UploadLimits,
    clock: Clock,
}

impl ContentService {
    pub fn new(store: Arc<dyn GitStore>, branch: impl Into<String>, secret: SiteSecret) -> Self {
        Self {
            builder: CommitBuilder::new(store.clone()),
            store,
            branch: branch.into(),
            secret,
            limits: UploadLimits::default(),
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub async fn create_post(&self, post: NewPost, token: &OwnerToken) -> ForumResult<CommitOutcome> {
        if post.title.trim().is_empty() || post.body.trim().is_empty() {
            return Err(ForumError::validation(
                "Title and description are required fields.",
            ));
        }
        self.check_post_image_count(post.images.len())?;

        let now = (self.clock)();
        let slug = slugify(&post.title)?;
        let date = now.format("%Y-%m-%d").to_string();
        let paths = PostPaths::new(&slug, &date)?;

        if self.store.get_content(&paths.document, &self.branch).await?.is_some() {
            return Err(ForumError::Conflict {
                message: format!("A post titled {:?} already exists for {}", post.title, date),
            });
        }

        let mut operations = Vec::with_capacity(post.images.len() + 1);
        let mut images = Vec::with_capacity(post.images.len());
        for upload in post.images {
            upload.validate(self.limits.max_post_image_bytes)?;
            let path = paths.image(&upload.file_name)?;
            images.push(ImageRef {
                url: self.store.file_url(&self.branch, &path),
                name: upload.file_name,
            });
            operations.push(FileOperation::binary(path, upload.bytes));
        }

        let document = PostDocument {
            front: PostFrontMatter {
                layout: POST_LAYOUT.to_string(),
                title: post.title.clone(),
                date: now.to_rfc3339_opts(SecondsFormat::Secs, true),
                author: DEFAULT_AUTHOR.to_string(),
                slug: slug.clone(),
                cookie_hash: self.secret.ownership_hash(token).to_string(),
                images,
            },
            body: post.body,
        };
        operations.push(FileOperation::text(&paths.document, document.render()?));

        info!(slug = %slug, date = %date, images = document.front.images.len(), "Creating post");
        self.commit(format!("Create new blog post: {}", post.title), operations)
            .await
    }

    pub async fn edit_post(&self, edit: PostEdit, token: &OwnerToken) -> ForumResult<CommitOutcome> {
        if edit.title.trim().is_empty() || edit.body.trim().is_empty() {
            return Err(ForumError::validation(
                "Title and description are required fields.",
            ));
        }
        let paths = PostPaths::new(&edit.slug, &edit.date)?;
        let existing = self.read_post(&paths, &edit.slug).await?;
        if !self.secret.verify(token, &existing.front.cookie_hash) {
            warn!(slug = %edit.slug, "Rejected post edit from non-owner");
            return Err(ForumError::unauthorized("You can only edit posts you created."));
        }

        let listed = self.store.list_directory(&paths.dir, &self.branch).await?;
        let on_disk = ordered_post_images(&existing.front.images, &listed);

        let replaced: HashSet<&str> = edit.new_images.iter().map(|i| i.file_name.as_str()).collect();
        let deleted: HashSet<&str> = edit
            .deleted_images
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .collect();

        let mut operations = Vec::new();
        let mut images = Vec::new();
        for name in on_disk {
            if replaced.contains(name.as_str()) {
                continue;
            }
            let path = paths.image(&name)?;
            if deleted.contains(name.as_str()) {
                debug!(path = %path, "Removing post image");
                operations.push(FileOperation::delete(path));
            } else {
                images.push(ImageRef {
                    url: self.store.file_url(&self.branch, &path),
                    name,
                });
            }
        }
        self.check_post_image_count(images.len() + edit.new_images.len())?;

        for upload in edit.new_images {
            upload.validate(self.limits.max_post_image_bytes)?;
            let path = paths.image(&upload.file_name)?;
            images.push(ImageRef {
                url: self.store.file_url(&self.branch, &path),
                name: upload.file_name,
            });
            operations.push(FileOperation::binary(path, upload.bytes));
        }

        let document = PostDocument {
            front: PostFrontMatter {
                title: edit.title.clone(),
                images,
                ..existing.front
            },
            body: edit.body,
        };
        operations.push(FileOperation::text(&paths.document, document.render()?));

        info!(slug = %edit.slug, operations = operations.len(), "Updating post");
        self.commit(format!("Update blog post: {}", edit.title), operations)
            .await
    }

    /// Remove a post together with its images and all of its comments.
    pub async fn delete_post(
        &self,
        slug: &str,
        date: &str,
        token: &OwnerToken,
    ) -> ForumResult<CommitOutcome> {
        let paths = PostPaths::new(slug, date)?;
        let existing = self.read_post(&paths, slug).await?;
        if !self.secret.verify(token, &existing.front.cookie_hash) {
            warn!(slug, "Rejected post deletion from non-owner");
            return Err(ForumError::unauthorized("You can only delete your own posts."));
        }

        let comments = CommentPaths::new(slug, date, None, (self.clock)())?;
        let mut operations = Vec::new();
        for dir in [paths.dir.as_str(), comments.dir.as_str()] {
            let listed = self.store.list_directory(dir, &self.branch).await?;
            operations.extend(
                listed
                    .into_iter()
                    .filter(DirEntry::is_file)
                    .map(|entry| FileOperation::delete(entry.path)),
            );
        }
        if operations.is_empty() {
            return Err(ForumError::not_found(
                "No files found for the specified post slug.",
            ));
        }

        info!(slug, files = operations.len(), "Deleting post");
        self.commit(format!("Delete post: {}", slug), operations).await
    }

    /// Create a comment, or edit an existing one when `comment_id` is set.
    pub async fn submit_comment(
        &self,
        submission: CommentSubmission,
        token: &OwnerToken,
    ) -> ForumResult<CommitOutcome> {
        if submission.post_slug.trim().is_empty() || submission.text.trim().is_empty() {
            return Err(ForumError::validation(
                "Post slug and comment are required fields.",
            ));
        }

        let now = (self.clock)();
        let paths = CommentPaths::new(
            &submission.post_slug,
            &submission.post_date,
            submission.comment_id.as_deref(),
            now,
        )?;
        let hash = self.secret.ownership_hash(token);

        let previous = match &submission.comment_id {
            Some(_) => {
                let record = self.read_comment(&paths).await?;
                if !self.secret.verify(token, &record.cookie_hash) {
                    warn!(comment = %paths.comment_id, "Rejected comment edit from non-owner");
                    return Err(ForumError::unauthorized("You can only edit your own comments."));
                }
                Some(record)
            }
            None => {
                if self.store.get_content(&paths.comment, &self.branch).await?.is_some() {
                    return Err(ForumError::Conflict {
                        message: format!(
                            "Comment {} already exists, please try again",
                            paths.comment_id
                        ),
                    });
                }
                None
            }
        };

        let mut operations = Vec::new();
        let mut record = CommentRecord {
            date: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            cookie_hash: hash.to_string(),
            message: submission.text,
            image: None,
            image_path: None,
        };

        match (submission.image, &previous) {
            (Some(upload), _) => {
                upload.validate(self.limits.max_comment_image_bytes)?;
                let path = paths.image(&upload.file_name)?;
                let old_path = previous.as_ref().and_then(|p| p.image_file_path(&paths));
                if let Some(old_path) = old_path.filter(|old| *old != path) {
                    if self.file_exists(paths.post_dir(), &old_path).await? {
                        operations.push(FileOperation::delete(old_path));
                    }
                }
                record.image = Some(self.store.file_url(&self.branch, &path));
                record.image_path = Some(path.clone());
                operations.push(FileOperation::binary(path, upload.bytes));
            }
            (None, Some(previous)) => {
                record.image = previous.image.clone();
                record.image_path = previous.image_file_path(&paths);
            }
            (None, None) => {}
        }

        operations.push(FileOperation::text(&paths.comment, record.render()?));

        let message = match &submission.comment_id {
            Some(id) => format!("Edit comment {} in post: {}", id, submission.post_slug),
            None => format!("Add comment to post: {}", submission.post_slug),
        };
        info!(
            slug = %submission.post_slug,
            comment = %paths.comment_id,
            edit = previous.is_some(),
            "Submitting comment"
        );
        self.commit(message, operations).await
    }

    pub async fn delete_comment(
        &self,
        post_slug: &str,
        post_date: &str,
        comment_id: &str,
        token: &OwnerToken,
    ) -> ForumResult<CommitOutcome> {
        let paths = CommentPaths::new(post_slug, post_date, Some(comment_id), (self.clock)())?;
        let record = self.read_comment(&paths).await?;
        if !self.secret.verify(token, &record.cookie_hash) {
            warn!(comment = comment_id, "Rejected comment deletion from non-owner");
            return Err(ForumError::unauthorized("You can only delete your own comments."));
        }

        let mut operations = vec![FileOperation::delete(&paths.comment)];
        if let Some(image) = record.image_file_path(&paths) {
            if self.file_exists(paths.post_dir(), &image).await? {
                operations.push(FileOperation::delete(image));
            } else {
                debug!(path = %image, "Comment image already gone");
            }
        }

        info!(slug = post_slug, comment = comment_id, files = operations.len(), "Deleting comment");
        self.commit(
            format!("Delete comment {} from post: {}", comment_id, post_slug),
            operations,
        )
        .await
    }

    /// Latest CI run for a commit; `pending` until one is observed.
    pub async fn commit_status(&self, commit_id: &str) -> ForumResult<CommitStatus> {
        let commit_id = commit_id.trim();
        if commit_id.is_empty() {
            return Err(ForumError::validation("Missing required parameter: sha"));
        }
        if !commit_id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ForumError::validation(format!(
                "Invalid commit id: {}",
                commit_id
            )));
        }
        let runs = self.store.list_runs_for_commit(commit_id).await?;
        let status = CommitStatus::from_runs(&runs);
        debug!(sha = commit_id, status = %status.status, "Resolved commit status");
        Ok(status)
    }

    async fn commit(
        &self,
        message: String,
        operations: Vec<FileOperation>,
    ) -> ForumResult<CommitOutcome> {
        let request = CommitRequest::new(&self.branch, message).with_operations(operations);
        Ok(self.builder.create_commit(request).await?)
    }

    async fn read_post(&self, paths: &PostPaths, slug: &str) -> ForumResult<PostDocument> {
        match self.store.get_text(&paths.document, &self.branch).await? {
            Some(text) => PostDocument::parse(&text),
            None => Err(ForumError::not_found(format!("Post not found: {}", slug))),
        }
    }

    async fn read_comment(&self, paths: &CommentPaths) -> ForumResult<CommentRecord> {
        match self.store.get_text(&paths.comment, &self.branch).await? {
            Some(text) => CommentRecord::parse(&text),
            None => Err(ForumError::not_found(format!(
                "Comment not found: {}",
                paths.comment_id
            ))),
        }
    }

    async fn file_exists(&self, dir: &str, path: &str) -> ForumResult<bool> {
        let listed = self.store.list_directory(dir, &self.branch).await?;
        Ok(listed.iter().any(|entry| entry.is_file() && entry.path == path))
    }

    fn check_post_image_count(&self, count: usize) -> ForumResult<()> {
        if count > self.limits.max_post_images {
            return Err(ForumError::validation(format!(
                "A post can have at most {} images",
                self.limits.max_post_images
            )));
        }
        Ok(())
    }
}

pub fn is_image_name(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Post-owned image files in the listing, in the order the document lists
/// them, followed by any the document does not mention.
fn ordered_post_images(referenced: &[ImageRef], listed: &[DirEntry]) -> Vec<String> {
    let available: Vec<&str> = listed
        .iter()
        .filter(|entry| entry.is_file())
        .map(|entry| entry.name.as_str())
        .filter(|name| {
            *name != POST_DOCUMENT && !name.starts_with(COMMENT_IMAGE_PREFIX) && is_image_name(name)
        })
        .collect();

    let mut ordered: Vec<String> = referenced
        .iter()
        .map(|image| image.name.as_str())
        .filter(|name| available.contains(name))
        .map(str::to_string)
        .collect();
    for name in available {
        if !ordered.iter().any(|known| known == name) {
            ordered.push(name.to_string());
        }
    }
    ordered
}
