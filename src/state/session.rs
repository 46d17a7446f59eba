//! Session store: the authoritative in-memory record of who is logged in.
//!
//! LIFECYCLE
//! =========
//! `Uninitialized -> Revalidating | LoggedOut` on [`SessionStore::initialize`],
//! `Revalidating -> Authenticated | LoggedOut` when the background `/auth/me`
//! check resolves, `Authenticated -> LoggedOut` on logout or any `401`, and
//! `LoggedOut -> Authenticated` on login/signup.
//!
//! TRADE-OFFS
//! ==========
//! Startup seeds the user from the cached profile before the server has
//! confirmed the token, so the first render is immediate but may show a
//! logged-in state that flips to logged-out once revalidation fails.
//!
//! Requests cannot be cancelled. Every transition that replaces the session
//! bumps a generation counter, and a revalidation outcome is only applied if
//! the generation it started under is still current. A revalidation that
//! resolves after a logout therefore cannot resurrect the session.
//!
//! All storage writes made here happen under the state lock and before the
//! new snapshot is published, so no subscriber observes an authenticated
//! session without a persisted token.

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::auth::Session;
use super::storage::Credentials;
use crate::net::error::ApiError;
use crate::net::http::ApiClient;
use crate::net::types::{AuthResponse, LoginRequest, MeResponse, Role, SignupRequest, UserProfile};

const LOGIN_PATH: &str = "/auth/login";
const SIGNUP_PATH: &str = "/auth/signup";
const ME_PATH: &str = "/auth/me";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    /// Seeded from the cached profile; `/auth/me` is in flight.
    Revalidating,
    Authenticated,
    LoggedOut,
}

struct Inner {
    session: Session,
    phase: SessionPhase,
    /// Set once the startup check has run for this mount.
    initialized: bool,
    generation: u64,
}

struct Shared {
    state: Mutex<Inner>,
    updates: watch::Sender<Session>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner) {
        self.updates.send_replace(inner.session.clone());
    }

    /// Reset after a `401`. The HTTP client has already cleared storage.
    fn expire(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.session = Session::logged_out();
        inner.phase = SessionPhase::LoggedOut;
        inner.initialized = false;
        self.publish(&inner);
    }
}

/// Cloneable handle to the session. Clones share state.
#[derive(Clone)]
pub struct SessionStore {
    client: ApiClient,
    shared: Arc<Shared>,
}

impl SessionStore {
    /// Create a store on top of `client`, sharing its storage, and register
    /// the store's reset with the client's `401` handling.
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        let (updates, _) = watch::channel(Session::loading());
        let shared = Arc::new(Shared {
            state: Mutex::new(Inner {
                session: Session::loading(),
                phase: SessionPhase::Uninitialized,
                initialized: false,
                generation: 0,
            }),
            updates,
        });

        let weak = Arc::downgrade(&shared);
        client.on_unauthorized(move || {
            if let Some(shared) = weak.upgrade() {
                shared.expire();
            }
        });

        Self { client, shared }
    }

    /// Run the startup check. Returns the background revalidation task when
    /// a persisted session was found; awaiting it is optional.
    ///
    /// Runs at most once until [`SessionStore::logout`] (or a `401`) resets
    /// the guard; repeated calls return `None` without touching the network.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn initialize(&self) -> Option<JoinHandle<()>> {
        let generation = {
            let mut inner = self.shared.lock();
            if inner.initialized {
                tracing::debug!("session already initialized; skipping startup check");
                return None;
            }
            inner.initialized = true;

            let Some(cached) = self.client.storage().read_pair() else {
                inner.session = Session::logged_out();
                inner.phase = SessionPhase::LoggedOut;
                self.shared.publish(&inner);
                tracing::debug!("no persisted session");
                return None;
            };

            // Optimistic: trust the cached profile until the server answers.
            tracing::info!(user_id = cached.user.id, "restored cached session; revalidating");
            inner.session = Session::authenticated(cached.user);
            inner.phase = SessionPhase::Revalidating;
            self.shared.publish(&inner);
            inner.generation
        };

        let store = self.clone();
        Some(tokio::spawn(async move { store.revalidate(generation).await }))
    }

    async fn revalidate(&self, generation: u64) {
        let outcome = self.client.get::<MeResponse>(ME_PATH).await;

        let mut inner = self.shared.lock();
        if inner.generation != generation {
            tracing::debug!("discarding revalidation result for a replaced session");
            return;
        }

        match outcome {
            Ok(MeResponse { user: Some(user) }) => {
                if let Err(e) = self.client.storage().write_user(&user) {
                    tracing::warn!(error = %e, "failed to persist refreshed profile");
                }
                inner.session = Session::authenticated(user);
                inner.phase = SessionPhase::Authenticated;
            }
            Ok(MeResponse { user: None }) => {
                inner.phase = SessionPhase::Authenticated;
            }
            Err(e) => {
                tracing::warn!(error = %e, code = e.code(), "session revalidation failed; logging out");
                self.client.storage().clear();
                inner.session = Session::logged_out();
                inner.phase = SessionPhase::LoggedOut;
            }
        }
        self.shared.publish(&inner);
    }

    /// Log in with email and password.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for empty fields (no request is sent),
    /// the server's rejection unmodified (usually [`ApiError::Authentication`]),
    /// or [`ApiError::Storage`] if the credentials cannot be persisted.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        let email = require_field("email", email)?;
        require_field("password", password)?;

        let auth: AuthResponse = self
            .client
            .post(LOGIN_PATH, &LoginRequest { email, password })
            .await?;
        self.establish(auth)
    }

    /// Create an account and log in as it.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::login`].
    pub async fn signup(&self, name: &str, email: &str, password: &str, role: Role) -> Result<UserProfile, ApiError> {
        let name = require_field("name", name)?;
        let email = require_field("email", email)?;
        require_field("password", password)?;

        let auth: AuthResponse = self
            .client
            .post(SIGNUP_PATH, &SignupRequest { name, email, password, role })
            .await?;
        self.establish(auth)
    }

    fn establish(&self, auth: AuthResponse) -> Result<UserProfile, ApiError> {
        let credentials = Credentials { token: auth.token, user: auth.user };

        let mut inner = self.shared.lock();
        // Persist before the in-memory update becomes visible. A failed write
        // leaves the current session, and any pending revalidation, intact.
        self.client.storage().write_pair(&credentials)?;
        inner.generation += 1;
        inner.session = Session::authenticated(credentials.user.clone());
        inner.phase = SessionPhase::Authenticated;
        inner.initialized = true;
        self.shared.publish(&inner);

        tracing::info!(user_id = credentials.user.id, role = %credentials.user.role, "logged in");
        Ok(credentials.user)
    }

    /// Drop the session locally. The next [`SessionStore::initialize`] runs
    /// the startup check again.
    pub fn logout(&self) {
        let mut inner = self.shared.lock();
        inner.generation += 1;
        self.client.storage().clear();
        inner.session = Session::logged_out();
        inner.phase = SessionPhase::LoggedOut;
        inner.initialized = false;
        self.shared.publish(&inner);
        tracing::info!("logged out");
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.shared.lock().session.clone()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        self.shared.lock().session.user.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.lock().session.loading
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    /// Receive a snapshot after every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.shared.updates.subscribe()
    }

    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

fn require_field<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::invalid_input(format!("{field} is required")));
    }
    Ok(trimmed)
}
