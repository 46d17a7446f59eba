//! Role-specific views assembled from the typed API.

pub mod assignment;
pub mod dashboard;
