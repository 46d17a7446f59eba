//! Networking modules for the portal REST API.
//!
//! SYSTEM CONTEXT
//! ==============
//! `http` owns request decoration and the global `401` policy, `api` wraps
//! each endpoint with typed inputs/outputs, `types` defines the wire schema
//! and `error` the failure taxonomy shared by all of them.

pub mod api;
pub mod error;
pub mod http;
pub mod types;
