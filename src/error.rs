//! Error taxonomy shared by every synchronization component.

use thiserror::Error;

pub const DEFAULT_HTTP_MESSAGE: &str = "An error occurred";

/// Discriminant of [`SyncError`], for callers that branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Http,
    Validation,
    StaleSession,
    Cancelled,
    Decode,
    Config,
}

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The request failed before any response arrived.
    #[error("network error: {message}")]
    Network { message: String },
    /// The backend answered with a non-2xx status.
    #[error("{message} (status {status})")]
    Http { status: u16, message: String },
    #[error("validation failed: {0}")]
    Validation(String),
    /// The session expired while the operation was running.
    #[error("session expired")]
    StaleSession,
    /// An in-flight fetch was cancelled before it settled.
    #[error("request cancelled")]
    Cancelled,
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Http { .. } => ErrorKind::Http,
            Self::Validation(_) => ErrorKind::Validation,
            Self::StaleSession => ErrorKind::StaleSession,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status carried by the error, if the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Human-readable message without the status suffix.
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } | Self::Network { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::decode(error.to_string());
        }
        match error.status() {
            Some(status) => Self::http(status.as_u16(), error.to_string()),
            None => Self::network(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(SyncError::http(404, "gone").kind(), ErrorKind::Http);
        assert_eq!(SyncError::network("refused").kind(), ErrorKind::Network);
        assert_eq!(SyncError::StaleSession.kind(), ErrorKind::StaleSession);
        assert_eq!(SyncError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn status_only_for_http() {
        assert_eq!(SyncError::http(409, "busy").status(), Some(409));
        assert_eq!(SyncError::network("x").status(), None);
    }

    #[test]
    fn http_display_carries_status() {
        let err = SyncError::http(500, "boom");
        assert_eq!(err.to_string(), "boom (status 500)");
        assert_eq!(err.message(), "boom");
    }
}
