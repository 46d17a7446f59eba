//! Client-side session state.
//!
//! SYSTEM CONTEXT
//! ==============
//! `storage` persists the credential pair, `session` owns the live session
//! and its lifecycle, and `auth` holds the snapshot type plus the access
//! rules front ends apply before showing a view.

pub mod auth;
pub mod session;
pub mod storage;
