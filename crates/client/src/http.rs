//! HTTP client with an explicit interceptor chain.
//!
//! All backend traffic funnels through [`ApiClient`]. The chain has three
//! stages, installed once at startup:
//!
//! 1. **Request decorators** - ordered pre-send mutations (the session
//!    manager attaches the bearer token here).
//! 2. **Response recovery** - a single handler consulted on a 401 that has
//!    not been retried yet. It may authorize exactly one retry of the
//!    original request; a 401 on the retried request is final.
//! 3. **Generic error notification** - the tail handler surfacing non-401
//!    failures to the notification sink. Recovery runs first and a 401
//!    never reaches this stage, so a transparently refreshed request is
//!    invisible to the user.
//!
//! Requests are described by [`ApiRequest`] values rather than one-shot
//! builders so the recovery stage can re-issue them with fresh decorators.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::ApiError;
use crate::notify::{Notification, Notifier};

/// Pre-send mutation of an outgoing request.
pub trait RequestDecorator: Send + Sync {
    /// Apply this decorator to an outgoing request.
    fn decorate(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder;
}

/// Verdict of a [`ResponseRecovery`] handler for a first-time 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Recovery succeeded; re-issue the original request once.
    Retry,
    /// Recovery failed; propagate the original 401 to the caller.
    GiveUp,
}

/// Handler consulted when a response comes back 401.
#[async_trait]
pub trait ResponseRecovery: Send + Sync {
    /// Called on a 401 that has not been retried yet.
    async fn on_unauthorized(&self) -> Recovery;

    /// Called when the retried request observed a second consecutive 401.
    async fn on_retry_unauthorized(&self);
}

/// A re-issuable description of a backend request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Describe a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// Describe a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Parse` if the body cannot be serialized.
    pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self, ApiError> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
        })
    }

    /// Describe a POST request without a body.
    #[must_use]
    pub fn post_empty(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: None,
        }
    }
}

/// Client for the Clementine backend API.
///
/// Cheap to clone; clones share the interceptor chain and connection pool.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: String,
    decorators: RwLock<Vec<Arc<dyn RequestDecorator>>>,
    recovery: RwLock<Option<Arc<dyn ResponseRecovery>>>,
    error_notifier: RwLock<Option<Arc<dyn Notifier>>>,
}

impl ApiClient {
    /// Create a new client for the given API base URL.
    #[must_use]
    pub fn new(base_url: &Url) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                http: reqwest::Client::new(),
                base_url: base_url.as_str().trim_end_matches('/').to_owned(),
                decorators: RwLock::new(Vec::new()),
                recovery: RwLock::new(None),
                error_notifier: RwLock::new(None),
            }),
        }
    }

    /// The API base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Append a request decorator to the chain.
    pub fn register_decorator(&self, decorator: Arc<dyn RequestDecorator>) {
        self.inner.decorators.write().push(decorator);
    }

    /// Install the 401 recovery handler (at most one).
    pub fn set_recovery(&self, recovery: Arc<dyn ResponseRecovery>) {
        *self.inner.recovery.write() = Some(recovery);
    }

    /// Install the generic error-notification tail.
    pub fn set_error_notifier(&self, notifier: Arc<dyn Notifier>) {
        *self.inner.error_notifier.write() = Some(notifier);
    }

    // =========================================================================
    // Typed helpers
    // =========================================================================

    /// GET `path` and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, non-success status, or a
    /// body that does not decode into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(&ApiRequest::get(path)).await?;
        Self::decode(response).await
    }

    /// POST a JSON body to `path` and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure, non-success status, or a
    /// body that does not decode into `T`.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &impl Serialize,
    ) -> Result<T, ApiError> {
        let response = self.send(&ApiRequest::post(path, body)?).await?;
        Self::decode(response).await
    }

    /// POST a JSON body to `path`, ignoring the response body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or non-success status.
    pub async fn post_unit(&self, path: &str, body: &impl Serialize) -> Result<(), ApiError> {
        self.send(&ApiRequest::post(path, body)?).await?;
        Ok(())
    }

    // =========================================================================
    // Interceptor pipeline
    // =========================================================================

    /// Send a request through the full chain.
    ///
    /// Returns `Ok` only for success statuses; everything else is mapped to
    /// `ApiError` after recovery and generic notification have run.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failure or a non-success status that
    /// recovery did not resolve.
    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let outcome = self.dispatch(request).await;

        if let Err(err) = &outcome
            && !err.is_unauthorized()
        {
            // 401s are excluded: recovery already ran (or declined) and the
            // session layer notifies on its own terms.
            self.notify_error(err);
        }

        outcome
    }

    /// Send a request with decorators applied but without recovery or
    /// generic notification. Used by the session manager for the auth
    /// endpoints themselves, where a 401 is an answer, not an expiry.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` on transport failure. Non-success statuses
    /// are returned as `Ok`; the caller inspects them.
    pub async fn send_raw(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        self.send_once(request).await
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let response = self.send_once(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_status(response).await;
        }

        let recovery = self.inner.recovery.read().clone();
        let Some(handler) = recovery else {
            return Self::check_status(response).await;
        };

        match handler.on_unauthorized().await {
            Recovery::Retry => {
                debug!(path = %request.path, "Retrying request after session recovery");
                let retried = self.send_once(request).await?;
                if retried.status() == StatusCode::UNAUTHORIZED {
                    // Retried exactly once; a second 401 is final.
                    handler.on_retry_unauthorized().await;
                }
                Self::check_status(retried).await
            }
            Recovery::GiveUp => Self::check_status(response).await,
        }
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}{}", self.inner.base_url, request.path);
        let mut builder = self.inner.http.request(request.method.clone(), &url);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let decorators = self.inner.decorators.read().clone();
        for decorator in &decorators {
            builder = decorator.decorate(builder);
        }

        Ok(builder.send().await?)
    }

    /// Map a non-success response to `ApiError::Status`, extracting the
    /// server-provided message when the body carries one.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_server_message(&body);
        warn!(status = %status, message = %message, "Backend request failed");
        Err(ApiError::Status { status, message })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn notify_error(&self, err: &ApiError) {
        let notifier = self.inner.error_notifier.read().clone();
        if let Some(notifier) = notifier {
            notifier.notify(Notification::error(err.user_message()));
        }
    }
}

/// Pull a human-readable message out of an error body.
///
/// The backend answers errors with `{"message": "..."}`; plain-text bodies
/// are passed through as-is.
pub(crate) fn extract_server_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body).map_or_else(|_| body.to_owned(), |e| e.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_request_shapes() {
        let get = ApiRequest::get("/cart");
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.path, "/cart");
        assert!(get.body.is_none());

        let post = ApiRequest::post("/cart/add", &serde_json::json!({"productId": "p-1"}))
            .expect("serializable body");
        assert_eq!(post.method, Method::POST);
        assert_eq!(
            post.body,
            Some(serde_json::json!({"productId": "p-1"}))
        );

        let refresh = ApiRequest::post_empty("/auth/refresh");
        assert!(refresh.body.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let url = Url::parse("http://localhost:8080/api/").expect("url");
        let client = ApiClient::new(&url);
        assert_eq!(client.base_url(), "http://localhost:8080/api");
    }

    #[test]
    fn test_extract_server_message() {
        assert_eq!(
            extract_server_message("{\"message\":\"Invalid credentials\"}"),
            "Invalid credentials"
        );
        assert_eq!(extract_server_message("plain text error"), "plain text error");
        assert_eq!(extract_server_message(""), "");
    }
}
