//! # Client transport
//!
//! The calls the page engine makes against the annotation endpoints. Every
//! mutating call carries the anti-forgery nonce the host page was rendered with.

use crate::reconcile::{merge_thread_lists, probe_urls};
use an_core::{CommentView, Created, PersonMatch, ThreadSummary};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

pub const NONCE_HEADER: &str = "X-Annotate-Nonce";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Transport failure; list calls degrade to empty results.
    #[error("network error: {0}")]
    Network(String),
    #[error("server answered {status}: {code}")]
    Status { status: u16, code: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Machine-readable code from an error response, e.g. `must_close`.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Status { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnnotationApi: Send + Sync {
    async fn threads(&self, page_url: &str) -> Result<Vec<ThreadSummary>, ClientError>;
    async fn create_thread(&self, page_url: &str, selector: &str) -> Result<i64, ClientError>;
    async fn comments(&self, thread_id: i64) -> Result<Vec<CommentView>, ClientError>;
    async fn post_comment(&self, thread_id: i64, content: &str, page_url: &str) -> Result<i64, ClientError>;
    async fn close_thread(&self, thread_id: i64) -> Result<(), ClientError>;
    async fn delete_thread(&self, thread_id: i64) -> Result<(), ClientError>;
    async fn search_people(&self, term: &str) -> Result<Vec<PersonMatch>, ClientError>;
    async fn disconnect(&self) -> Result<(), ClientError>;
}

/// Threads for the page at `current_url`: canonical URL first, then the exact
/// URL, merged by id. Failed lookups count as empty.
pub async fn fetch_threads_for_page(api: &dyn AnnotationApi, current_url: &str) -> Vec<ThreadSummary> {
    let mut lists = Vec::new();
    for url in probe_urls(current_url) {
        match api.threads(&url).await {
            Ok(list) => lists.push(list),
            Err(err) => {
                debug!(page_url = %url, error = %err, "thread fetch failed, treating as empty");
            }
        }
    }
    merge_thread_lists(lists)
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// [`AnnotationApi`] over HTTP.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base: String,
    nonce: Option<String>,
    bearer: Option<String>,
    session_cookie: Option<String>,
}

impl HttpApi {
    /// `base` is the endpoint root, e.g. `https://site.org/annotate/v1`.
    pub fn new(base: &str) -> Self {
        Self {
            client: Client::new(),
            base: base.trim_end_matches('/').to_string(),
            nonce: None,
            bearer: None,
            session_cookie: None,
        }
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Raw `name=value` cookie pair of a collaborator session.
    pub fn with_session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{path}", self.base));
        if let Some(nonce) = &self.nonce {
            builder = builder.header(NONCE_HEADER, nonce);
        }
        if let Some(token) = &self.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(cookie) = &self.session_cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }
        builder
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, response.json::<ErrorBody>().await.ok()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

fn status_error(status: StatusCode, body: Option<ErrorBody>) -> ClientError {
    let code = body.map(|b| b.error).unwrap_or_else(|| "request_failed".into());
    warn!(status = status.as_u16(), code = %code, "annotation request rejected");
    ClientError::Status {
        status: status.as_u16(),
        code,
    }
}

#[derive(Deserialize)]
struct Ack {}

#[async_trait]
impl AnnotationApi for HttpApi {
    async fn threads(&self, page_url: &str) -> Result<Vec<ThreadSummary>, ClientError> {
        self.send(self.request(Method::POST, "/threads/query").json(&json!({ "url": page_url })))
            .await
    }

    async fn create_thread(&self, page_url: &str, selector: &str) -> Result<i64, ClientError> {
        let created: Created = self
            .send(
                self.request(Method::POST, "/threads")
                    .json(&json!({ "url": page_url, "selector": selector })),
            )
            .await?;
        Ok(created.id)
    }

    async fn comments(&self, thread_id: i64) -> Result<Vec<CommentView>, ClientError> {
        self.send(self.request(Method::POST, "/comments/query").json(&json!({ "thread_id": thread_id })))
            .await
    }

    async fn post_comment(&self, thread_id: i64, content: &str, page_url: &str) -> Result<i64, ClientError> {
        let created: Created = self
            .send(self.request(Method::POST, "/comments").json(&json!({
                "thread_id": thread_id,
                "content": content,
                "url": page_url,
            })))
            .await?;
        Ok(created.id)
    }

    async fn close_thread(&self, thread_id: i64) -> Result<(), ClientError> {
        let _: Ack = self
            .send(self.request(Method::POST, &format!("/threads/{thread_id}/close")))
            .await?;
        Ok(())
    }

    async fn delete_thread(&self, thread_id: i64) -> Result<(), ClientError> {
        let _: Ack = self
            .send(self.request(Method::DELETE, &format!("/threads/{thread_id}")))
            .await?;
        Ok(())
    }

    async fn search_people(&self, term: &str) -> Result<Vec<PersonMatch>, ClientError> {
        self.send(self.request(Method::POST, "/users/search").json(&json!({ "term": term })))
            .await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        let _: Ack = self
            .send(self.request(Method::POST, "/session/disconnect"))
            .await?;
        Ok(())
    }
}
