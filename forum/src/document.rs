//! Stored document formats.
//!
//! Posts are Markdown files with a YAML front matter block, comments are
//! standalone YAML records. Both are rendered from typed structs so the
//! output is deterministic and parses back to the same value.

use crate::error::{ForumError, ForumResult};
use crate::paths::{validate_segment, CommentPaths};
use serde::{Deserialize, Serialize};

const FRONT_MATTER_FENCE: &str = "---\n";
const FRONT_MATTER_CLOSE: &str = "\n---\n";
const RAW_SUFFIX: &str = "?raw=true";

pub const POST_LAYOUT: &str = "post";
pub const DEFAULT_AUTHOR: &str = "Anonymous";

/// An image attached to a post, by file name and public URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFrontMatter {
    pub layout: String,
    pub title: String,
    pub date: String,
    pub author: String,
    pub slug: String,
    /// Empty on posts that predate ownership; nobody can edit those.
    #[serde(default)]
    pub cookie_hash: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDocument {
    pub front: PostFrontMatter,
    pub body: String,
}

impl PostDocument {
    /// Front matter, a blank line, the body, then one Markdown image
    /// reference per attached image.
    pub fn render(&self) -> ForumResult<String> {
        let yaml = serde_yaml::to_string(&self.front)?;
        let mut out = String::with_capacity(yaml.len() + self.body.len() + 64);
        out.push_str(FRONT_MATTER_FENCE);
        out.push_str(&yaml);
        out.push_str(FRONT_MATTER_FENCE);
        out.push('\n');
        out.push_str(&self.body);
        out.push_str("\n\n");
        out.push_str(&image_block(&self.front.images));
        Ok(out)
    }

    pub fn parse(text: &str) -> ForumResult<Self> {
        let rest = text
            .strip_prefix(FRONT_MATTER_FENCE)
            .ok_or_else(|| malformed("post has no front matter"))?;
        let close = rest
            .find(FRONT_MATTER_CLOSE)
            .ok_or_else(|| malformed("post front matter is not terminated"))?;

        let yaml = &rest[..close + 1];
        let front: PostFrontMatter = serde_yaml::from_str(yaml)?;
        let content = &rest[close + FRONT_MATTER_CLOSE.len()..];

        // Documents written by hand, or before images were tracked in the
        // front matter, keep their whole content as body.
        let body = content
            .strip_suffix(image_block(&front.images).as_str())
            .and_then(|c| c.strip_prefix('\n'))
            .and_then(|c| c.strip_suffix("\n\n"))
            .map(str::to_string)
            .unwrap_or_else(|| content.trim().to_string());

        Ok(Self { front, body })
    }
}

fn image_block(images: &[ImageRef]) -> String {
    images
        .iter()
        .map(|image| format!("\n![{}]({})\n", image.name, image.url))
        .collect()
}

fn malformed(message: &str) -> ForumError {
    ForumError::Document {
        message: message.to_string(),
    }
}

/// One comment, stored as its own YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub date: String,
    #[serde(default)]
    pub cookie_hash: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl CommentRecord {
    pub fn render(&self) -> ForumResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn parse(text: &str) -> ForumResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Repository path of the attached image, if any.
    ///
    /// Older records only carry the public URL; the file name is then taken
    /// from its last segment. Paths outside the post directory are ignored.
    pub fn image_file_path(&self, paths: &CommentPaths) -> Option<String> {
        let prefix = format!("{}/", paths.post_dir());
        if let Some(path) = &self.image_path {
            let name = path.strip_prefix(&prefix)?;
            return validate_segment("image name", name)
                .ok()
                .map(|_| path.clone());
        }

        let url = self.image.as_deref()?;
        let url = url.strip_suffix(RAW_SUFFIX).unwrap_or(url);
        let name = url.rsplit('/').next()?;
        validate_segment("image name", name).ok()?;
        Some(format!("{}{}", prefix, name))
    }
}
