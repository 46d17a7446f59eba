//! Session snapshot and route access rules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Used by front ends to decide whether to show a view, wait for the session
//! to load, or send the user to the login screen.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use crate::net::types::{Role, UserProfile};

/// Who is logged in, as currently known to the client.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub user: Option<UserProfile>,
    /// True only until the persisted session has been checked at startup.
    pub loading: bool,
}

impl Session {
    /// Session before the startup check has run.
    #[must_use]
    pub fn loading() -> Self {
        Self { user: None, loading: true }
    }

    #[must_use]
    pub fn logged_out() -> Self {
        Self { user: None, loading: false }
    }

    #[must_use]
    pub fn authenticated(user: UserProfile) -> Self {
        Self { user: Some(user), loading: false }
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|user| user.role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::loading()
    }
}

/// Outcome of checking a session against a protected view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Startup check still running; show a spinner.
    Pending,
    RedirectToLogin,
    /// Logged in, but the role is not allowed here; go home instead.
    Forbidden,
    Granted,
}

/// Decide access to a view restricted to `allowed` roles. An empty slice
/// admits any logged-in user.
#[must_use]
pub fn route_access(session: &Session, allowed: &[Role]) -> Access {
    if session.loading {
        return Access::Pending;
    }
    let Some(user) = &session.user else {
        return Access::RedirectToLogin;
    };
    if allowed.is_empty() || allowed.contains(&user.role) {
        Access::Granted
    } else {
        Access::Forbidden
    }
}

/// Redirect to login whenever the session has loaded and no user is present.
#[must_use]
pub fn should_redirect_unauth(session: &Session) -> bool {
    route_access(session, &[]) == Access::RedirectToLogin
}
