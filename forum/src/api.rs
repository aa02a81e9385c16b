//! Endpoint contract, independent of any HTTP framework.
//!
//! A host adapter turns its request type into an [`EndpointRequest`], calls
//! one of the [`Endpoints`] handlers and writes the [`EndpointResponse`] back
//! as JSON with the given status code.

use crate::error::{ForumError, ForumResult};
use crate::ownership::{OwnerToken, TOKEN_HEADER};
use crate::service::{CommentSubmission, ContentService, ImageUpload, NewPost, PostEdit};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use store::{CommitOutcome, CommitStatus};
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Options,
    Other(String),
}

impl Method {
    pub fn parse(method: &str) -> Self {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Self::Get,
            "POST" => Self::Post,
            "OPTIONS" => Self::Options,
            other => Self::Other(other.to_string()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Options => "OPTIONS",
            Self::Other(method) => method,
        }
    }
}

/// A decoded request: form or query fields, uploaded files and the headers
/// the endpoints care about.
#[derive(Debug, Clone)]
pub struct EndpointRequest {
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub fields: HashMap<String, String>,
    pub files: Vec<ImageUpload>,
}

impl EndpointRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HashMap::new(),
            fields: HashMap::new(),
            files: Vec::new(),
        }
    }

    pub fn post() -> Self {
        Self::new(Method::Post)
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// Header names are matched case-insensitively.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_file(mut self, file: ImageUpload) -> Self {
        self.files.push(file);
        self
    }

    pub fn with_token(self, token: &OwnerToken) -> Self {
        self.with_header(TOKEN_HEADER, token.as_str())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Present and not blank.
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    fn token(&self) -> ForumResult<OwnerToken> {
        OwnerToken::from_headers(self.header(TOKEN_HEADER), self.header("cookie"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EndpointResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl EndpointResponse {
    fn json<T: Serialize>(status: u16, body: &T) -> Self {
        let body = serde_json::to_value(body).unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize response body");
            Value::Null
        });
        Self {
            status,
            body: Some(body),
        }
    }

    fn empty() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    fn from_error(err: &ForumError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            error!(error = %err, "Request failed");
        } else {
            warn!(error = %err, status, "Request rejected");
        }
        Self::json(
            status,
            &FailureBody {
                success: false,
                error: err.user_message(),
            },
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SuccessBody<'a> {
    success: bool,
    #[serde(flatten)]
    outcome: &'a CommitOutcome,
}

#[derive(Debug, Serialize)]
struct FailureBody {
    success: bool,
    error: String,
}

/// Split a comma separated list, dropping blanks.
pub fn parse_name_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct Endpoints {
    service: Arc<ContentService>,
}

impl Endpoints {
    pub fn new(service: Arc<ContentService>) -> Self {
        Self { service }
    }

    /// Create a post, or edit one when `slug` is given.
    pub async fn submit_post(&self, request: EndpointRequest) -> EndpointResponse {
        self.mutation(request, |service, request| async move {
            let token = request.token()?;
            let (Some(title), Some(body)) = (request.field("title"), request.field("description"))
            else {
                return Err(ForumError::validation(
                    "Title and description are required fields.",
                ));
            };

            match request.field("slug") {
                Some(slug) => {
                    let edit = PostEdit {
                        slug: slug.trim().to_string(),
                        date: request.field("date").unwrap_or_default().trim().to_string(),
                        title: title.to_string(),
                        body: body.to_string(),
                        deleted_images: request
                            .field("deletedFiles")
                            .map(parse_name_list)
                            .unwrap_or_default(),
                        new_images: request.files.clone(),
                    };
                    service.edit_post(edit, &token).await
                }
                None => {
                    let post = NewPost {
                        title: title.to_string(),
                        body: body.to_string(),
                        images: request.files.clone(),
                    };
                    service.create_post(post, &token).await
                }
            }
        })
        .await
    }

    pub async fn submit_comment(&self, request: EndpointRequest) -> EndpointResponse {
        self.mutation(request, |service, request| async move {
            let token = request.token()?;
            let (Some(post_slug), Some(text)) = (request.field("postSlug"), request.field("comment"))
            else {
                return Err(ForumError::validation(
                    "Post slug and comment are required fields.",
                ));
            };

            let submission = CommentSubmission {
                post_slug: post_slug.trim().to_string(),
                post_date: request.field("postDate").unwrap_or_default().trim().to_string(),
                text: text.to_string(),
                comment_id: request.field("commentId").map(|id| id.trim().to_string()),
                image: request.files.first().cloned(),
            };
            service.submit_comment(submission, &token).await
        })
        .await
    }

    /// Delete a comment when `commentId` is given, otherwise the whole post.
    pub async fn delete_content(&self, request: EndpointRequest) -> EndpointResponse {
        self.mutation(request, |service, request| async move {
            let token = request.token()?;
            let Some(post_slug) = request.field("postSlug") else {
                return Err(ForumError::validation("Post slug is required."));
            };
            let post_slug = post_slug.trim();
            let post_date = request.field("postDate").unwrap_or_default().trim();

            match request.field("commentId") {
                Some(comment_id) => {
                    service
                        .delete_comment(post_slug, post_date, comment_id.trim(), &token)
                        .await
                }
                None => service.delete_post(post_slug, post_date, &token).await,
            }
        })
        .await
    }

    pub async fn check_status(&self, request: EndpointRequest) -> EndpointResponse {
        if request.method != Method::Get {
            return EndpointResponse::from_error(&ForumError::MethodNotAllowed {
                method: request.method.as_str().to_string(),
            });
        }
        let result: ForumResult<CommitStatus> = match request.field("sha") {
            Some(sha) => self.service.commit_status(sha).await,
            None => Err(ForumError::validation("Missing required parameter: sha")),
        };
        match result {
            Ok(status) => EndpointResponse::json(200, &status),
            Err(err) => EndpointResponse::from_error(&err),
        }
    }

    async fn mutation<F, Fut>(&self, request: EndpointRequest, handler: F) -> EndpointResponse
    where
        F: FnOnce(Arc<ContentService>, EndpointRequest) -> Fut,
        Fut: std::future::Future<Output = ForumResult<CommitOutcome>>,
    {
        match request.method {
            Method::Options => return EndpointResponse::empty(),
            Method::Post => {}
            ref other => {
                return EndpointResponse::from_error(&ForumError::MethodNotAllowed {
                    method: other.as_str().to_string(),
                })
            }
        }

        match handler(self.service.clone(), request).await {
            Ok(outcome) => EndpointResponse::json(
                200,
                &SuccessBody {
                    success: true,
                    outcome: &outcome,
                },
            ),
            Err(err) => EndpointResponse::from_error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ownership::SiteSecret;
    use serde_json::json;
    use store::InMemoryStore;

    fn endpoints() -> Endpoints {
        let store = Arc::new(InMemoryStore::new("master"));
        let service = ContentService::new(store, "master", SiteSecret::new("secret").unwrap());
        Endpoints::new(Arc::new(service))
    }

    #[test]
    fn test_parse_name_list() {
        assert_eq!(
            parse_name_list(" a.png, ,b.jpg,,"),
            vec!["a.png".to_string(), "b.jpg".to_string()]
        );
        assert!(parse_name_list("").is_empty());
    }

    #[test]
    fn test_method_parse() {
        assert_eq!(Method::parse("post"), Method::Post);
        assert_eq!(Method::parse("PUT"), Method::Other("PUT".to_string()));
    }

    #[tokio::test]
    async fn test_non_post_is_rejected() {
        let response = endpoints()
            .submit_post(EndpointRequest::get().with_field("title", "x"))
            .await;
        assert_eq!(response.status, 405);
        assert_eq!(
            response.body,
            Some(json!({
                "success": false,
                "error": "Method not allowed. Only POST requests are accepted."
            }))
        );
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let response = endpoints()
            .delete_content(EndpointRequest::new(Method::Options))
            .await;
        assert_eq!(response, EndpointResponse::empty());
    }

    #[tokio::test]
    async fn test_missing_token() {
        let response = endpoints()
            .submit_comment(
                EndpointRequest::post()
                    .with_field("postSlug", "a")
                    .with_field("comment", "hi"),
            )
            .await;
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body.unwrap()["error"],
            "User cookie is required but not found in request headers"
        );
    }

    #[tokio::test]
    async fn test_required_fields() {
        let token = OwnerToken::issue();
        let api = endpoints();

        let response = api
            .submit_post(EndpointRequest::post().with_token(&token).with_field("title", "t"))
            .await;
        assert_eq!(response.status, 400);
        assert_eq!(
            response.body.unwrap()["error"],
            "Title and description are required fields."
        );

        let response = api
            .submit_comment(EndpointRequest::post().with_token(&token).with_field("comment", "c"))
            .await;
        assert_eq!(
            response.body.unwrap()["error"],
            "Post slug and comment are required fields."
        );

        let response = api
            .delete_content(EndpointRequest::post().with_token(&token))
            .await;
        assert_eq!(response.body.unwrap()["error"], "Post slug is required.");
    }

    #[tokio::test]
    async fn test_check_status() {
        let api = endpoints();

        let response = api.check_status(EndpointRequest::post()).await;
        assert_eq!(response.status, 405);

        let response = api.check_status(EndpointRequest::get()).await;
        assert_eq!(response.status, 400);
        assert_eq!(response.body.unwrap()["error"], "Missing required parameter: sha");

        let response = api
            .check_status(EndpointRequest::get().with_field("sha", "abc123"))
            .await;
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            Some(json!({"status": "pending", "conclusion": null, "createdAt": null}))
        );
    }

    #[tokio::test]
    async fn test_create_post_response_shape() {
        let token = OwnerToken::issue();
        let response = endpoints()
            .submit_post(
                EndpointRequest::post()
                    .with_header("Cookie", format!("forum_user_id={}", token.as_str()))
                    .with_field("title", "Hello World")
                    .with_field("description", "First post."),
            )
            .await;

        assert_eq!(response.status, 200);
        let body = response.body.unwrap();
        assert_eq!(body["success"], true);
        assert!(body["commitId"].as_str().is_some_and(|id| !id.is_empty()));
        assert!(body["storeUrl"]
            .as_str()
            .is_some_and(|url| url.starts_with("memory://commit/")));
    }
}
