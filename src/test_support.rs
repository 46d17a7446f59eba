//! In-process mock of the portal API for async tests.
//!
//! Routes are mounted under `/api`, matching the default base URL layout.
//! Every request is recorded (with the `/api` prefix stripped) so tests can
//! assert on headers and query strings the client actually sent.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;

use crate::config::{HttpTimeouts, PortalConfig};
use crate::net::http::ApiClient;
use crate::net::types::{Role, UserProfile};
use crate::state::storage::{Change, Credentials, MemoryBackend, SessionStorage, StorageBackend, StorageError, TOKEN_KEY};

// =============================================================================
// REQUEST LOG
// =============================================================================

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_owned())
        })
    }
}

#[derive(Clone, Default)]
pub(crate) struct RequestLog(Arc<Mutex<Vec<RecordedRequest>>>);

impl RequestLog {
    pub fn all(&self) -> Vec<RecordedRequest> {
        self.0.lock().unwrap().clone()
    }

    pub fn to(&self, path: &str) -> Vec<RecordedRequest> {
        self.all().into_iter().filter(|r| r.path == path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.to(path).len()
    }
}

async fn record(State(log): State<RequestLog>, request: Request, next: Next) -> Response {
    let path = request.uri().path();
    log.0.lock().unwrap().push(RecordedRequest {
        method: request.method().to_string(),
        path: path.strip_prefix("/api").unwrap_or(path).to_owned(),
        query: request.uri().query().map(str::to_owned),
        headers: request.headers().clone(),
    });
    next.run(request).await
}

// =============================================================================
// SERVER
// =============================================================================

pub(crate) struct MockApi {
    pub base_url: String,
    pub log: RequestLog,
}

impl MockApi {
    /// Serve `routes` under `/api` on an ephemeral localhost port.
    pub async fn spawn(routes: Router) -> Self {
        let log = RequestLog::default();
        let app = Router::new()
            .nest("/api", routes)
            .layer(middleware::from_fn_with_state(log.clone(), record));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { base_url: format!("http://{addr}/api"), log }
    }

    pub fn client(&self, storage: SessionStorage) -> ApiClient {
        client_for(&self.base_url, storage)
    }
}

pub(crate) fn client_for(base_url: &str, storage: SessionStorage) -> ApiClient {
    let config = PortalConfig::new(base_url, PathBuf::from("unused-session.json"), HttpTimeouts::default()).unwrap();
    ApiClient::new(&config, storage).unwrap()
}

/// A base URL nothing listens on: the port is bound, then released.
pub(crate) async fn unreachable_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api")
}

// =============================================================================
// FIXTURES
// =============================================================================

pub(crate) fn student(id: i64) -> UserProfile {
    UserProfile { id, name: format!("Student {id}"), email: format!("s{id}@x.com"), role: Role::Student }
}

pub(crate) fn admin(id: i64) -> UserProfile {
    UserProfile { id, name: format!("Admin {id}"), email: format!("admin{id}@x.com"), role: Role::Admin }
}

pub(crate) fn credentials(token: &str, user: UserProfile) -> Credentials {
    Credentials { token: token.to_owned(), user }
}

/// Memory backend that counts how many times the token was cleared.
pub(crate) struct CountingBackend {
    inner: MemoryBackend,
    clears: Arc<AtomicUsize>,
}

impl CountingBackend {
    pub fn new() -> (Self, Arc<AtomicUsize>) {
        let clears = Arc::new(AtomicUsize::new(0));
        (Self { inner: MemoryBackend::default(), clears: clears.clone() }, clears)
    }
}

impl StorageBackend for CountingBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn apply(&self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        if changes.contains(&Change::Remove(TOKEN_KEY)) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.apply(changes)
    }
}
