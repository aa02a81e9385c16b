use crate::error::{ForumError, ForumResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use store::GitHubConfig;
use tracker::TrackerConfig;

const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadLimits {
    pub max_post_image_bytes: usize,
    pub max_post_images: usize,
    pub max_comment_image_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_post_image_bytes: 10 * MIB,
            max_post_images: 10,
            max_comment_image_bytes: 5 * MIB,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub site_secret: String,
    pub github: GitHubConfig,
    pub limits: UploadLimits,
    pub tracker: TrackerConfig,
}

impl fmt::Debug for ForumConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForumConfig")
            .field("site_secret", &store::config::redacted(&self.site_secret))
            .field("github", &self.github)
            .field("limits", &self.limits)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl ForumConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a TOML file, then let the environment override it.
    pub fn load(path: Option<&Path>) -> ForumResult<Self> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| ForumError::Config {
                    message: format!("cannot read {}: {}", path.display(), e),
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        Ok(config.merge_env())
    }

    pub fn from_toml(text: &str) -> ForumResult<Self> {
        toml::from_str(text).map_err(|e| ForumError::Config {
            message: format!("invalid configuration: {}", e),
        })
    }

    /// `SITE_SECRET` plus the store's `GITHUB_*` variables.
    pub fn merge_env(mut self) -> Self {
        if let Ok(secret) = std::env::var("SITE_SECRET") {
            if !secret.is_empty() {
                self.site_secret = secret;
            }
        }
        self.github = self.github.merge_env();
        self
    }

    pub fn with_site_secret(mut self, secret: impl Into<String>) -> Self {
        self.site_secret = secret.into();
        self
    }

    pub fn with_github(mut self, github: GitHubConfig) -> Self {
        self.github = github;
        self
    }

    pub fn with_limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.site_secret.is_empty() {
            return Err("SITE_SECRET is not configured".to_string());
        }
        if self.limits.max_post_images == 0 {
            return Err("max_post_images must be greater than 0".to_string());
        }
        if self.limits.max_post_image_bytes == 0 || self.limits.max_comment_image_bytes == 0 {
            return Err("image size limits must be greater than 0".to_string());
        }
        self.tracker.validate()
    }
}
