//! Failure taxonomy for portal API calls.
//!
//! Every user action surfaces at most one `ApiError`; nothing is retried.
//! Non-2xx statuses are classified here so callers can match on the kind
//! of failure instead of raw status codes.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

use crate::state::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid credentials, or an expired/revoked token (`401`).
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// Missing/malformed input, caught locally (`status == None`) or
    /// rejected by the server with a 4xx.
    #[error("validation failed: {message}")]
    Validation { status: Option<u16>, message: String },

    /// The requested assignment or submission does not exist (`404`).
    #[error("not found: {message}")]
    NotFound { message: String },

    /// The server failed to handle the request (5xx or unexpected status).
    #[error("server error (status {status}): {message}")]
    Server { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body did not match the expected schema.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// Persisting or clearing credentials failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ApiError {
    /// Classify a non-success response.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = server_message(body).unwrap_or_else(|| default_message(status).to_owned());
        match status {
            401 => Self::Authentication { message },
            404 => Self::NotFound { message },
            400..=499 => Self::Validation { status: Some(status), message },
            _ => Self::Server { status, message },
        }
    }

    /// Local input validation failure; no request was sent.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Validation { status: None, message: message.into() }
    }

    /// HTTP status behind this error, when a response was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::NotFound { .. } => Some(404),
            Self::Validation { status, .. } => *status,
            Self::Server { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) | Self::Storage(_) => None,
        }
    }

    /// Stable machine-readable code for display and scripting.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "E_AUTH",
            Self::Validation { .. } => "E_VALIDATION",
            Self::NotFound { .. } => "E_NOT_FOUND",
            Self::Server { .. } => "E_SERVER",
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::Storage(_) => "E_STORAGE",
        }
    }

    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Extract the server-supplied message from a JSON error body
/// (`{"message": ...}` or `{"error": ...}`).
pub(crate) fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(serde_json::Value::as_str))
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}

fn default_message(status: u16) -> &'static str {
    match status {
        401 => "unauthorized",
        403 => "forbidden",
        404 => "resource not found",
        400..=499 => "request rejected",
        _ => "unexpected server response",
    }
}
