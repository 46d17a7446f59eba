//! HTTP client with session-aware request and response policies.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every API call in the crate goes through [`ApiClient::request`]. It reads
//! the bearer token from [`SessionStorage`] on each call, so a login or
//! logout is picked up by the next request without rebuilding the client.
//!
//! POLICIES
//! ========
//! - Auth paths (`/auth/...`) are sent with no-store cache directives, and
//!   auth reads get a `_t` timestamp parameter so no cache layer can answer
//!   with a stale `304`.
//! - A `401` from any endpoint clears persisted credentials and runs every
//!   hook registered with [`ApiClient::on_unauthorized`] before the error is
//!   returned to the caller. This is the only writer of session storage
//!   outside the session store. A `401` for a token that is no longer the
//!   stored one (a late reply after logout or re-login) changes nothing.
//! - No retries. Transport failures and non-2xx statuses both come back as
//!   [`ApiError`].

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::header::{CACHE_CONTROL, EXPIRES, HeaderMap, HeaderValue, PRAGMA};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ApiError;
use crate::config::PortalConfig;
use crate::state::storage::SessionStorage;

pub const AUTH_PATH_PREFIX: &str = "/auth/";
pub const CACHE_BUST_PARAM: &str = "_t";
const NO_STORE: &str = "no-store, no-cache, must-revalidate, private";

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Cloneable handle to the portal API. Clones share the connection pool,
/// storage and unauthorized hooks.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    storage: SessionStorage,
    hooks: Arc<Mutex<Vec<UnauthorizedHook>>>,
}

impl ApiClient {
    /// Build a client for `config.api_url` backed by `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &PortalConfig, storage: SessionStorage) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeouts.request {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.timeouts.connect {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ApiError::Network(format!("HTTP client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url: Arc::from(config.api_url.as_str()),
            storage,
            hooks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Register a callback run after any `401` has cleared persisted
    /// credentials. Front ends use it to send the user back to login.
    pub fn on_unauthorized(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(hook));
    }

    /// Send a request and decode the JSON response body.
    ///
    /// An empty success body decodes as JSON `null`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] on transport failure, a status-classified
    /// error for non-2xx responses, or [`ApiError::Decode`] if the body does
    /// not match `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let path = normalize_path(path);
        let mut builder = self.http.request(method.clone(), join_url(&self.base_url, &path));

        let sent_token = self.storage.token();
        if let Some(token) = &sent_token {
            builder = builder.bearer_auth(token);
        }
        if is_auth_path(&path) {
            builder = builder.headers(no_store_headers());
            if method == Method::GET {
                builder = builder.query(&[(CACHE_BUST_PARAM, cache_bust_value())]);
            }
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::debug!(%method, path = %path, error = %e, "request failed before response");
            ApiError::from(e)
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.reject_session(&method, &path, sent_token.as_deref());
        }

        let text = response.text().await?;
        if !status.is_success() {
            tracing::debug!(%method, path = %path, status = status.as_u16(), "request returned error status");
            return Err(ApiError::from_status(status.as_u16(), &text));
        }
        decode_body(&text)
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        let body = encode_body(body)?;
        self.request(Method::POST, path, Some(&body)).await
    }

    /// `PUT path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        let body = encode_body(body)?;
        self.request(Method::PUT, path, Some(&body)).await
    }

    /// `PATCH path` with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn patch<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, ApiError> {
        let body = encode_body(body)?;
        self.request(Method::PATCH, path, Some(&body)).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Clear the session a `401` was issued against. A rejection of a token
    /// that has since been replaced (or dropped) is returned to the caller
    /// without touching the current session.
    fn reject_session(&self, method: &Method, path: &str, sent_token: Option<&str>) {
        if self.storage.token().as_deref() != sent_token {
            tracing::debug!(%method, path, "401 for a replaced token; keeping current session");
            return;
        }
        tracing::warn!(%method, path, "request rejected with 401; clearing session");
        self.storage.clear();
        // Run hooks outside the lock; a hook may register another.
        let hooks: Vec<UnauthorizedHook> = self
            .hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            hook();
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') { path.to_owned() } else { format!("/{path}") }
}

/// Whether `path` addresses a session-sensitive auth endpoint.
pub(crate) fn is_auth_path(path: &str) -> bool {
    normalize_path(path).starts_with(AUTH_PATH_PREFIX)
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), normalize_path(path))
}

fn no_store_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
    headers
}

fn cache_bust_value() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
        .to_string()
}

fn encode_body(body: &impl Serialize) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::invalid_input(format!("request body encode failed: {e}")))
}

fn decode_body<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
}
