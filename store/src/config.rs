use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_WEB_URL: &str = "https://github.com";
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub api_url: String,
    pub web_url: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            owner: String::new(),
            repo: String::new(),
            branch: DEFAULT_BRANCH.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("gitforum/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &redacted(&self.token))
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("branch", &self.branch)
            .field("api_url", &self.api_url)
            .field("web_url", &self.web_url)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Stand-in for a credential in `Debug` output; empty stays visibly empty.
pub fn redacted(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

impl GitHubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `GITHUB_TOKEN`, `GITHUB_OWNER`, `GITHUB_REPO`,
    /// `GITHUB_BRANCH` and `GITHUB_API_URL` when set.
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    pub fn merge_env(mut self) -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(token) = var("GITHUB_TOKEN") {
            self.token = token;
        }
        if let Some(owner) = var("GITHUB_OWNER") {
            self.owner = owner;
        }
        if let Some(repo) = var("GITHUB_REPO") {
            self.repo = repo;
        }
        if let Some(branch) = var("GITHUB_BRANCH") {
            self.branch = branch;
        }
        if let Some(api_url) = var("GITHUB_API_URL") {
            self.api_url = api_url;
        }
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_repository(mut self, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.repo = repo.into();
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_web_url(mut self, web_url: impl Into<String>) -> Self {
        self.web_url = web_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.token.is_empty() || self.owner.is_empty() || self.repo.is_empty() {
            return Err(
                "GitHub configuration is missing. Please configure GITHUB_TOKEN, GITHUB_OWNER, and GITHUB_REPO."
                    .to_string(),
            );
        }

        if self.branch.trim().is_empty() {
            return Err("Branch cannot be empty".to_string());
        }

        for url in [&self.api_url, &self.web_url] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("URL must start with http:// or https://: {}", url));
            }
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Serde adapter storing a `Duration` as whole seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
