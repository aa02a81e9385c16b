use crate::backend::{GitStore, StoreError, StoreResult};
use crate::config::GitHubConfig;
use crate::types::{
    CommitInfo, DirEntry, EntryKind, EntrySource, RunList, RunStatus, TreeEntry, WorkflowRun,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ApiObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    object: ApiObject,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    tree: ApiObject,
    #[serde(default)]
    parents: Vec<ApiObject>,
}

#[derive(Debug, Deserialize)]
struct ApiContentItem {
    name: String,
    path: String,
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

impl ApiContentItem {
    /// Files over 1 MB come back without inline content (`encoding: none`).
    fn has_inline_content(&self) -> bool {
        self.encoding.as_deref() == Some("base64")
            && (self.size == 0 || self.content.as_deref().is_some_and(|c| !c.trim().is_empty()))
    }
}

#[derive(Debug, Deserialize)]
struct ApiBlob {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Directory(Vec<ApiContentItem>),
    File(ApiContentItem),
}

#[derive(Debug, Deserialize)]
struct ApiWorkflowRun {
    status: Option<RunStatus>,
    conclusion: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiRunList {
    total_count: u64,
    #[serde(default)]
    workflow_runs: Vec<ApiWorkflowRun>,
}

/// [`GitStore`] backed by the GitHub REST API (Git data, contents and actions endpoints).
pub struct GitHubStore {
    client: reqwest::Client,
    config: GitHubConfig,
    api_base: Url,
}

impl GitHubStore {
    pub fn new(config: GitHubConfig) -> StoreResult<Self> {
        config
            .validate()
            .map_err(|message| StoreError::InvalidConfig { message })?;

        let api_base = Url::parse(config.api_url.trim_end_matches('/')).map_err(|e| {
            StoreError::InvalidConfig {
                message: format!("Invalid API URL {}: {}", config.api_url, e),
            }
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.token)).map_err(|_| {
            StoreError::InvalidConfig {
                message: "GitHub token contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(AUTHORIZATION, auth);
        let agent = HeaderValue::from_str(&config.user_agent).map_err(|_| {
            StoreError::InvalidConfig {
                message: "User agent contains invalid header characters".to_string(),
            }
        })?;
        headers.insert(USER_AGENT, agent);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::InvalidConfig {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            config,
            api_base,
        })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// `/repos/{owner}/{repo}/` followed by `segments`; each `/`-separated
    /// piece becomes its own percent-encoded path segment.
    fn repo_url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.api_base.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| StoreError::InvalidConfig {
                message: format!("API URL cannot be a base: {}", self.api_base),
            })?;
            path.pop_if_empty()
                .extend(["repos", self.config.owner.as_str(), self.config.repo.as_str()]);
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    fn handle_http_error(err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Upstream {
                status: 504,
                message: "Request to GitHub timed out".to_string(),
            }
        } else if err.is_connect() {
            StoreError::Upstream {
                status: 503,
                message: "Cannot connect to GitHub".to_string(),
            }
        } else {
            StoreError::Network(err)
        }
    }

    fn error_for_status(status: StatusCode, headers: &HeaderMap, body: String, path: &str) -> StoreError {
        let rate_limited = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "0")
            .unwrap_or(false);

        match status.as_u16() {
            404 => StoreError::not_found(path),
            429 => StoreError::RateLimit,
            403 if rate_limited => StoreError::RateLimit,
            401 | 403 => StoreError::Authentication,
            code => StoreError::Upstream {
                status: code,
                message: extract_message(&body),
            },
        }
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> StoreResult<reqwest::Response> {
        debug!(%method, url = %url, "GitHub request");
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        request.send().await.map_err(Self::handle_http_error)
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
        path: &str,
    ) -> StoreResult<T> {
        let response = self.send(method, url, body).await?;
        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(Self::error_for_status(status, &headers, text, path));
        }
        let text = response.text().await.map_err(StoreError::Network)?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn fetch_content(&self, path: &str, reference: &str) -> StoreResult<Option<ApiContent>> {
        let mut url = self.repo_url(&["contents", path])?;
        url.query_pairs_mut().append_pair("ref", reference);

        match self
            .request_json::<ApiContent>(Method::GET, url, None, path)
            .await
        {
            Ok(content) => Ok(Some(content)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn tree_entry_json(entry: &TreeEntry) -> Value {
        match &entry.source {
            EntrySource::Blob(sha) => json!({
                "path": entry.path,
                "mode": entry.mode,
                "type": "blob",
                "sha": sha,
            }),
            EntrySource::Inline(content) => json!({
                "path": entry.path,
                "mode": entry.mode,
                "type": "blob",
                "content": content,
            }),
            EntrySource::Remove => json!({
                "path": entry.path,
                "mode": entry.mode,
                "type": "blob",
                "sha": Value::Null,
            }),
        }
    }
}

/// GitHub wraps base64 payloads at 60 columns.
fn decode_base64(encoded: &str, path: &str) -> StoreResult<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).map_err(|e| StoreError::Upstream {
        status: 200,
        message: format!("Invalid base64 content for {}: {}", path, e),
    })
}

fn extract_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl GitStore for GitHubStore {
    async fn get_ref(&self, branch: &str) -> StoreResult<String> {
        let url = self.repo_url(&["git", "ref", "heads", branch])?;
        let reference: ApiRef = self
            .request_json(Method::GET, url, None, &format!("heads/{}", branch))
            .await?;
        Ok(reference.object.sha)
    }

    async fn get_commit(&self, sha: &str) -> StoreResult<CommitInfo> {
        let url = self.repo_url(&["git", "commits", sha])?;
        let commit: ApiCommit = self.request_json(Method::GET, url, None, sha).await?;
        Ok(CommitInfo {
            sha: commit.sha,
            tree_sha: commit.tree.sha,
            parents: commit.parents.into_iter().map(|p| p.sha).collect(),
        })
    }

    async fn create_blob(&self, content: &[u8]) -> StoreResult<String> {
        let url = self.repo_url(&["git", "blobs"])?;
        let body = json!({
            "content": STANDARD.encode(content),
            "encoding": "base64",
        });
        let blob: ApiObject = self
            .request_json(Method::POST, url, Some(body), "git/blobs")
            .await?;
        debug!(sha = %blob.sha, bytes = content.len(), "Created blob");
        Ok(blob.sha)
    }

    async fn create_tree(&self, base_tree: &str, entries: &[TreeEntry]) -> StoreResult<String> {
        let url = self.repo_url(&["git", "trees"])?;
        let tree: Vec<Value> = entries.iter().map(Self::tree_entry_json).collect();
        let body = json!({
            "base_tree": base_tree,
            "tree": tree,
        });
        let created: ApiObject = self
            .request_json(Method::POST, url, Some(body), "git/trees")
            .await?;
        Ok(created.sha)
    }

    async fn create_commit(
        &self,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> StoreResult<String> {
        let url = self.repo_url(&["git", "commits"])?;
        let body = json!({
            "message": message,
            "tree": tree_sha,
            "parents": parents,
        });
        let commit: ApiObject = self
            .request_json(Method::POST, url, Some(body), "git/commits")
            .await?;
        Ok(commit.sha)
    }

    async fn update_ref(&self, branch: &str, sha: &str, expected: &str) -> StoreResult<()> {
        // The API has no expected-value parameter: check the tip first, then
        // rely on the non-forced update rejecting anything but a fast-forward.
        let current = self.get_ref(branch).await?;
        if current != expected {
            warn!(branch, expected, current = %current, "Branch moved before ref update");
            return Err(StoreError::Conflict {
                branch: branch.to_string(),
            });
        }

        let url = self.repo_url(&["git", "refs", "heads", branch])?;
        let body = json!({ "sha": sha, "force": false });
        let path = format!("heads/{}", branch);
        match self
            .request_json::<Value>(Method::PATCH, url, Some(body), &path)
            .await
        {
            Ok(_) => {
                info!(branch, sha, "Updated branch ref");
                Ok(())
            }
            Err(StoreError::Upstream { status: 409 | 422, message }) => {
                warn!(branch, %message, "Ref update rejected as non-fast-forward");
                Err(StoreError::Conflict {
                    branch: branch.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_content(&self, path: &str, reference: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.fetch_content(path, reference).await? {
            Some(ApiContent::File(item)) if item.has_inline_content() => {
                decode_base64(item.content.as_deref().unwrap_or_default(), path).map(Some)
            }
            Some(ApiContent::File(item)) => {
                let sha = item.sha.ok_or_else(|| StoreError::Upstream {
                    status: 200,
                    message: format!("No content or blob sha returned for {}", path),
                })?;
                debug!(path, sha = %sha, size = item.size, "Fetching large file through the blob API");
                let url = self.repo_url(&["git", "blobs", &sha])?;
                let blob: ApiBlob = self.request_json(Method::GET, url, None, path).await?;
                decode_base64(&blob.content, path).map(Some)
            }
            Some(ApiContent::Directory(_)) => Err(StoreError::validation(format!(
                "{} is a directory",
                path
            ))),
            None => Ok(None),
        }
    }

    async fn list_directory(&self, path: &str, reference: &str) -> StoreResult<Vec<DirEntry>> {
        match self.fetch_content(path, reference).await? {
            Some(ApiContent::Directory(items)) => Ok(items
                .into_iter()
                .filter_map(|item| {
                    let kind = match item.item_type.as_str() {
                        "file" => EntryKind::File,
                        "dir" => EntryKind::Dir,
                        _ => return None,
                    };
                    Some(DirEntry {
                        name: item.name,
                        path: item.path,
                        kind,
                    })
                })
                .collect()),
            Some(ApiContent::File(_)) | None => Ok(Vec::new()),
        }
    }

    async fn list_runs_for_commit(&self, sha: &str) -> StoreResult<RunList> {
        let mut url = self.repo_url(&["actions", "runs"])?;
        url.query_pairs_mut()
            .append_pair("head_sha", sha)
            .append_pair("per_page", "10");

        let list: ApiRunList = self
            .request_json(Method::GET, url, None, "actions/runs")
            .await?;
        debug!(sha, total = list.total_count, "Listed workflow runs");

        Ok(RunList {
            total_count: list.total_count,
            runs: list
                .workflow_runs
                .into_iter()
                .map(|run| WorkflowRun {
                    status: run.status.unwrap_or(RunStatus::Unknown),
                    conclusion: run.conclusion,
                    created_at: run.created_at,
                })
                .collect(),
        })
    }

    fn file_url(&self, branch: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/blob/{}/{}?raw=true",
            self.config.web_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            branch,
            path
        )
    }

    fn commit_url(&self, sha: &str) -> String {
        format!(
            "{}/{}/{}/commit/{}",
            self.config.web_url.trim_end_matches('/'),
            self.config.owner,
            self.config.repo,
            sha
        )
    }

    fn store_name(&self) -> &'static str {
        "github"
    }
}
