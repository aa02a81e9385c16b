//! Resource identity → repository paths.
//!
//! Pure functions. Every identifier is validated before it is spliced into a
//! path, so a crafted slug or comment id can never escape its directory.

use crate::error::{ForumError, ForumResult};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

pub const POSTS_DIR: &str = "_posts";
pub const COMMENTS_DIR: &str = "_data/comments";
pub const POST_DOCUMENT: &str = "index.md";
pub const COMMENT_IMAGE_PREFIX: &str = "comment-";
pub const COMMENT_EXTENSION: &str = "yml";

/// Comment ids are stamped in India Standard Time (+05:30).
const COMMENT_TZ_OFFSET_SECS: i64 = 5 * 3600 + 30 * 60;

/// Reject identifiers that could alter the directory structure.
pub fn validate_segment(kind: &str, value: &str) -> ForumResult<()> {
    if value.trim().is_empty() {
        return Err(ForumError::validation(format!("{} is required", kind)));
    }
    if value.contains('/')
        || value.contains('\\')
        || value.contains("..")
        || value.chars().any(char::is_control)
    {
        return Err(ForumError::validation(format!(
            "{} contains invalid characters: {}",
            kind, value
        )));
    }
    Ok(())
}

/// Post dates are the `YYYY-MM-DD` prefix of the post directory.
pub fn validate_date(date: &str) -> ForumResult<()> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ForumError::validation(format!("post date must be YYYY-MM-DD: {}", date)))
}

/// Lowercase, keep `[a-z0-9]`, whitespace and hyphen runs become one hyphen,
/// no leading or trailing hyphen.
pub fn slugify(title: &str) -> ForumResult<String> {
    static DISALLOWED: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    let disallowed = DISALLOWED.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("valid regex"));
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[\s-]+").expect("valid regex"));

    let lowered = title.to_lowercase();
    let cleaned = disallowed.replace_all(&lowered, "");
    let slug = separators
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string();

    if slug.is_empty() {
        return Err(ForumError::validation(format!(
            "title does not produce a usable slug: {:?}",
            title
        )));
    }
    Ok(slug)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPaths {
    pub dir: String,
    pub document: String,
}

impl PostPaths {
    pub fn new(slug: &str, date: &str) -> ForumResult<Self> {
        validate_segment("post slug", slug)?;
        validate_date(date)?;
        let dir = format!("{}/{}-{}", POSTS_DIR, date, slug);
        Ok(Self {
            document: format!("{}/{}", dir, POST_DOCUMENT),
            dir,
        })
    }

    /// The comment image prefix is reserved; post images may not use it.
    pub fn image(&self, file_name: &str) -> ForumResult<String> {
        validate_segment("image name", file_name)?;
        if file_name.starts_with(COMMENT_IMAGE_PREFIX) {
            return Err(ForumError::validation(format!(
                "post image names may not start with {:?}: {}",
                COMMENT_IMAGE_PREFIX, file_name
            )));
        }
        Ok(format!("{}/{}", self.dir, file_name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPaths {
    pub dir: String,
    pub comment_id: String,
    pub comment: String,
    post_dir: String,
}

impl CommentPaths {
    /// `comment_id` names an existing comment (edit); `None` derives a new id
    /// from `now` with second resolution.
    pub fn new(
        slug: &str,
        date: &str,
        comment_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ForumResult<Self> {
        let post = PostPaths::new(slug, date)?;
        let comment_id = match comment_id {
            Some(id) => {
                validate_segment("comment id", id)?;
                id.to_string()
            }
            None => default_comment_id(now),
        };
        let dir = format!("{}/{}-{}", COMMENTS_DIR, date, slug);
        Ok(Self {
            comment: format!("{}/{}.{}", dir, comment_id, COMMENT_EXTENSION),
            dir,
            comment_id,
            post_dir: post.dir,
        })
    }

    /// Comment images live next to the post's own images, prefixed so the
    /// post never lists them as its own.
    pub fn image(&self, file_name: &str) -> ForumResult<String> {
        validate_segment("image name", file_name)?;
        Ok(format!(
            "{}/{}{}",
            self.post_dir, COMMENT_IMAGE_PREFIX, file_name
        ))
    }

    pub fn post_dir(&self) -> &str {
        &self.post_dir
    }
}

/// `comment-DD-MM-YYYY--HH-MM-SS` in the fixed comment timezone.
pub fn default_comment_id(now: DateTime<Utc>) -> String {
    let local = now.naive_utc() + Duration::seconds(COMMENT_TZ_OFFSET_SECS);
    format!("comment-{}", local.format("%d-%m-%Y--%H-%M-%S"))
}
