//! Client for the assignment-submission portal REST API.
//!
//! ARCHITECTURE
//! ============
//! - `state::storage` is the only code that touches persisted credentials.
//! - `net::http::ApiClient` attaches the bearer token, disables caching for
//!   auth endpoints and resets the session on any `401`.
//! - `state::session::SessionStore` owns the in-memory session: seeded from
//!   storage at startup, revalidated once in the background.
//! - `pages` assembles the role-specific views on top of the typed API.

pub mod config;
pub mod net;
pub mod pages;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::PortalConfig;
pub use net::error::ApiError;
pub use net::http::ApiClient;
pub use net::types::{Role, UserProfile};
pub use state::auth::Session;
pub use state::session::{SessionPhase, SessionStore};
pub use state::storage::{Credentials, SessionStorage};
