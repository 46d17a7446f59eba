use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::http::StatusCode as AxumStatus;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::sync::Notify;

use super::*;
use crate::state::storage::{Change, MemoryBackend, SessionStorage, StorageBackend, StorageError};
use crate::test_support::{CountingBackend, MockApi, client_for, credentials, student, unreachable_base_url};

fn login_ok() -> Router {
    Router::new()
        .route(
            "/auth/login",
            post(|| async { Json(json!({ "token": "T1", "user": { "id": 1, "role": "student" } })) }),
        )
        .route("/assignments", get(|| async { Json(json!({ "assignments": [] })) }))
        .route(
            "/stats/overview",
            get(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Token expired" }))) }),
        )
}

fn me_returns(body: Value) -> Router {
    Router::new().route("/auth/me", get(move || std::future::ready(Json(body.clone()))))
}

fn me_rejects() -> Router {
    Router::new().route(
        "/auth/me",
        get(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Invalid token" }))) }),
    )
}

/// Memory backend whose writes can be switched to fail.
#[derive(Clone, Default)]
struct FlakyBackend {
    inner: Arc<MemoryBackend>,
    failing: Arc<AtomicBool>,
}

impl StorageBackend for FlakyBackend {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.get(key)
    }

    fn apply(&self, changes: &[Change<'_>]) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.inner.apply(changes)
    }
}

async fn wait_for_request(api: &MockApi, path: &str) {
    for _ in 0..400 {
        if api.log.count(path) > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no request to {path}");
}

// =============================================================================
// STARTUP
// =============================================================================

#[tokio::test]
async fn startup_without_persisted_session_is_logged_out() {
    let api = MockApi::spawn(me_returns(json!({}))).await;
    let store = SessionStore::new(api.client(SessionStorage::in_memory()));
    assert!(store.is_loading());
    assert_eq!(store.phase(), SessionPhase::Uninitialized);

    assert!(store.initialize().is_none());

    assert_eq!(store.session(), Session::logged_out());
    assert_eq!(store.phase(), SessionPhase::LoggedOut);
    assert_eq!(api.log.count("/auth/me"), 0);
}

#[tokio::test]
async fn startup_with_cached_session_renders_immediately_and_revalidates_once() {
    let api = MockApi::spawn(me_returns(json!({
        "user": { "id": 1, "name": "Renamed", "email": "s1@x.com", "role": "student" }
    })))
    .await;
    let storage = SessionStorage::in_memory();
    storage.write_pair(&credentials("T1", student(1))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    let revalidation = store.initialize().expect("revalidation task");

    // Seeded from cache before the server answers.
    assert_eq!(store.session(), Session::authenticated(student(1)));
    assert_eq!(store.phase(), SessionPhase::Revalidating);

    revalidation.await.unwrap();

    assert_eq!(store.current_user().unwrap().name, "Renamed");
    assert_eq!(storage.read_pair().unwrap().user.name, "Renamed");
    assert_eq!(storage.read_pair().unwrap().token, "T1");
    assert_eq!(store.phase(), SessionPhase::Authenticated);

    assert!(store.initialize().is_none());
    assert!(store.clone().initialize().is_none());
    assert_eq!(api.log.count("/auth/me"), 1);
    assert_eq!(api.log.to("/auth/me")[0].header("authorization"), Some("Bearer T1"));
}

#[tokio::test]
async fn revalidation_without_user_keeps_cached_profile() {
    let api = MockApi::spawn(me_returns(json!({}))).await;
    let storage = SessionStorage::in_memory();
    storage.write_pair(&credentials("T1", student(1))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    store.initialize().unwrap().await.unwrap();

    assert_eq!(store.current_user(), Some(student(1)));
    assert_eq!(store.phase(), SessionPhase::Authenticated);
    assert!(storage.read_pair().is_some());
}

#[tokio::test]
async fn rejected_revalidation_logs_out_and_clears_once() {
    let api = MockApi::spawn(me_rejects()).await;
    let (backend, clears) = CountingBackend::new();
    let storage = SessionStorage::new(backend);
    storage.write_pair(&credentials("T1", student(1))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    store.initialize().unwrap().await.unwrap();

    assert_eq!(store.session(), Session::logged_out());
    assert_eq!(store.phase(), SessionPhase::LoggedOut);
    assert!(storage.read_pair().is_none());
    assert_eq!(clears.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn network_failure_during_revalidation_logs_out() {
    let storage = SessionStorage::in_memory();
    storage.write_pair(&credentials("T1", student(1))).unwrap();
    let store = SessionStore::new(client_for(&unreachable_base_url().await, storage.clone()));

    store.initialize().unwrap().await.unwrap();

    assert!(store.current_user().is_none());
    assert!(!store.is_loading());
    assert!(storage.token().is_none());
    assert!(storage.read_pair().is_none());
}

#[tokio::test]
async fn logout_during_revalidation_is_not_resurrected() {
    let gate = Arc::new(Notify::new());
    let held = gate.clone();
    let routes = Router::new().route(
        "/auth/me",
        get(move || {
            let held = held.clone();
            async move {
                held.notified().await;
                Json(json!({ "user": { "id": 1, "role": "student" } }))
            }
        }),
    );
    let api = MockApi::spawn(routes).await;
    let storage = SessionStorage::in_memory();
    storage.write_pair(&credentials("T1", student(1))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    let revalidation = store.initialize().unwrap();
    wait_for_request(&api, "/auth/me").await;

    store.logout();
    gate.notify_one();
    revalidation.await.unwrap();

    assert_eq!(store.session(), Session::logged_out());
    assert_eq!(store.phase(), SessionPhase::LoggedOut);
    assert!(storage.read_pair().is_none());
}

#[tokio::test]
async fn stale_revalidation_failure_does_not_clear_a_new_login() {
    let gate = Arc::new(Notify::new());
    let held = gate.clone();
    let routes = login_ok().route(
        "/auth/me",
        get(move || {
            let held = held.clone();
            async move {
                held.notified().await;
                (AxumStatus::INTERNAL_SERVER_ERROR, Json(json!({ "message": "boom" })))
            }
        }),
    );
    let api = MockApi::spawn(routes).await;
    let storage = SessionStorage::in_memory();
    storage.write_pair(&credentials("T0", student(7))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    let revalidation = store.initialize().unwrap();
    wait_for_request(&api, "/auth/me").await;

    store.logout();
    store.login("a@x.com", "pw").await.unwrap();
    gate.notify_one();
    revalidation.await.unwrap();

    assert_eq!(store.current_user().unwrap().id, 1);
    assert_eq!(storage.read_pair().unwrap().token, "T1");
}

#[tokio::test]
async fn stale_revalidation_rejection_does_not_clear_a_new_login() {
    let gate = Arc::new(Notify::new());
    let held = gate.clone();
    let routes = login_ok().route(
        "/auth/me",
        get(move || {
            let held = held.clone();
            async move {
                held.notified().await;
                (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Invalid token" })))
            }
        }),
    );
    let api = MockApi::spawn(routes).await;
    let (backend, clears) = CountingBackend::new();
    let storage = SessionStorage::new(backend);
    storage.write_pair(&credentials("T0", student(7))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    let revalidation = store.initialize().unwrap();
    wait_for_request(&api, "/auth/me").await;

    store.logout();
    store.login("a@x.com", "pw").await.unwrap();
    gate.notify_one();
    revalidation.await.unwrap();

    assert_eq!(store.current_user().map(|user| user.id), Some(1));
    assert_eq!(store.phase(), SessionPhase::Authenticated);
    assert_eq!(storage.token().as_deref(), Some("T1"));
    // Only the explicit logout cleared storage.
    assert_eq!(clears.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_login_write_leaves_pending_revalidation_in_charge() {
    let gate = Arc::new(Notify::new());
    let held = gate.clone();
    let routes = login_ok().route(
        "/auth/me",
        get(move || {
            let held = held.clone();
            async move {
                held.notified().await;
                Json(json!({ "user": { "id": 7, "name": "Renamed", "role": "student" } }))
            }
        }),
    );
    let api = MockApi::spawn(routes).await;
    let backend = FlakyBackend::default();
    let failing = backend.failing.clone();
    let storage = SessionStorage::new(backend);
    storage.write_pair(&credentials("T0", student(7))).unwrap();
    let store = SessionStore::new(api.client(storage.clone()));

    let revalidation = store.initialize().unwrap();
    wait_for_request(&api, "/auth/me").await;

    failing.store(true, Ordering::SeqCst);
    let err = store.login("a@x.com", "pw").await.unwrap_err();
    assert_eq!(err.code(), "E_STORAGE");
    failing.store(false, Ordering::SeqCst);

    gate.notify_one();
    revalidation.await.unwrap();

    assert_eq!(store.phase(), SessionPhase::Authenticated);
    assert_eq!(store.current_user().unwrap().name, "Renamed");
    assert_eq!(storage.token().as_deref(), Some("T0"));
}

// =============================================================================
// LOGIN / SIGNUP / LOGOUT
// =============================================================================

#[tokio::test]
async fn login_persists_profile_and_authorizes_later_requests() {
    let api = MockApi::spawn(login_ok()).await;
    let storage = SessionStorage::in_memory();
    let store = SessionStore::new(api.client(storage.clone()));

    let user = store.login("a@x.com", "pw").await.unwrap();

    assert_eq!(user.id, 1);
    assert_eq!(user.role, Role::Student);
    assert_eq!(store.session(), Session::authenticated(user.clone()));
    assert_eq!(storage.read_pair(), Some(credentials("T1", user)));

    let _: Value = store.client().get("/assignments").await.unwrap();
    assert_eq!(api.log.to("/assignments")[0].header("authorization"), Some("Bearer T1"));
}

#[tokio::test]
async fn login_persists_before_subscribers_are_notified() {
    let api = MockApi::spawn(login_ok()).await;
    let storage = SessionStorage::in_memory();
    let store = SessionStore::new(api.client(storage.clone()));

    let mut updates = store.subscribe();
    let observed = storage.clone();
    let watcher = tokio::spawn(async move {
        updates.changed().await.unwrap();
        let session = updates.borrow_and_update().clone();
        (session, observed.read_pair())
    });

    store.login("a@x.com", "pw").await.unwrap();

    let (session, persisted) = watcher.await.unwrap();
    assert_eq!(session.user, persisted.map(|pair| pair.user));
    assert!(session.user.is_some());
}

#[tokio::test]
async fn login_then_logout_leaves_storage_empty() {
    let api = MockApi::spawn(login_ok()).await;
    let storage = SessionStorage::in_memory();
    let store = SessionStore::new(api.client(storage.clone()));

    store.login("a@x.com", "pw").await.unwrap();
    store.logout();

    assert!(storage.token().is_none());
    assert!(storage.read_pair().is_none());
    assert_eq!(store.session(), Session::logged_out());

    // The guard is reset, so the next startup check runs (and finds nothing).
    assert!(store.initialize().is_none());
    assert_eq!(store.phase(), SessionPhase::LoggedOut);
}

#[tokio::test]
async fn rejected_login_surfaces_server_error_without_retry() {
    let routes = Router::new().route(
        "/auth/login",
        post(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({ "message": "Invalid credentials" }))) }),
    );
    let api = MockApi::spawn(routes).await;
    let store = SessionStore::new(api.client(SessionStorage::in_memory()));

    let err = store.login("a@x.com", "wrong").await.unwrap_err();

    assert!(matches!(&err, ApiError::Authentication { message } if message == "Invalid credentials"));
    assert!(store.current_user().is_none());
    assert_eq!(api.log.count("/auth/login"), 1);
}

#[tokio::test]
async fn login_with_blank_fields_fails_locally() {
    let api = MockApi::spawn(login_ok()).await;
    let store = SessionStore::new(api.client(SessionStorage::in_memory()));

    let err = store.login("  ", "pw").await.unwrap_err();
    assert!(matches!(&err, ApiError::Validation { status: None, message } if message == "email is required"));

    let err = store.login("a@x.com", "").await.unwrap_err();
    assert!(matches!(err, ApiError::Validation { status: None, .. }));

    assert_eq!(api.log.count("/auth/login"), 0);
}

#[tokio::test]
async fn signup_sends_role_and_establishes_session() {
    let routes = Router::new().route(
        "/auth/signup",
        post(|Json(body): Json<Value>| async move {
            Json(json!({
                "token": "T2",
                "user": { "id": 5, "name": body["name"], "email": body["email"], "role": body["role"] }
            }))
        }),
    );
    let api = MockApi::spawn(routes).await;
    let storage = SessionStorage::in_memory();
    let store = SessionStore::new(api.client(storage.clone()));

    let user = store.signup("Grace", "g@x.com", "pw", Role::Admin).await.unwrap();

    assert_eq!(user.role, Role::Admin);
    assert_eq!(user.name, "Grace");
    assert!(store.session().is_admin());
    assert_eq!(storage.read_pair().unwrap().token, "T2");
    assert_eq!(store.phase(), SessionPhase::Authenticated);
}

#[tokio::test]
async fn unauthorized_response_anywhere_ends_the_session() {
    let api = MockApi::spawn(login_ok()).await;
    let (backend, clears) = CountingBackend::new();
    let storage = SessionStorage::new(backend);
    let store = SessionStore::new(api.client(storage.clone()));
    store.login("a@x.com", "pw").await.unwrap();

    let err = store.client().get::<Value>("/stats/overview").await.unwrap_err();

    assert!(err.is_authentication());
    assert_eq!(store.session(), Session::logged_out());
    assert_eq!(store.phase(), SessionPhase::LoggedOut);
    assert!(storage.read_pair().is_none());
    assert_eq!(clears.load(Ordering::SeqCst), 1);
}
