// Error handling module
// Defines the failure taxonomy surfaced to callers of the API client

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum length for error response bodies embedded in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Errors returned by the API client
///
/// `Clone` so that a single refresh outcome can be handed to every request
/// queued behind it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Transport failure or a response body that could not be decoded
    #[error("Network error: {0}")]
    Network(String),

    /// Backend answered with a non-success status other than 401
    #[error("API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// Backend rejected the credentials (401) and no refresh was possible
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// The refresh endpoint itself failed
    #[error("Token refresh failed: {message}")]
    RefreshRejected {
        status: Option<u16>,
        message: String,
    },

    /// The request was rejected again after a successful refresh
    #[error("Authentication rejected after token refresh: {0}")]
    RetryExhausted(String),

    /// The task driving the refresh was dropped before it settled
    #[error("Token refresh was cancelled")]
    RefreshCancelled,

    /// Persisted credential storage failed
    #[error("Credential storage error: {0}")]
    Storage(String),

    /// Request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Map a non-success response to an error. 401 becomes `AuthRejected`.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let message = truncate_body(body);
        match status {
            StatusCode::UNAUTHORIZED => ApiError::AuthRejected(message),
            _ => ApiError::Status {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether the caller should send the user back through login
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ApiError::AuthRejected(_)
                | ApiError::RefreshRejected { .. }
                | ApiError::RetryExhausted(_)
        )
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::AuthRejected(_) | ApiError::RetryExhausted(_) => Some(401),
            ApiError::RefreshRejected { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            return ApiError::InvalidRequest(e.to_string());
        }

        let kind = if e.is_timeout() {
            "timeout"
        } else if e.is_connect() {
            "connection_failed"
        } else if e.is_decode() {
            "decode_error"
        } else if e.is_body() {
            "body_error"
        } else {
            "request_error"
        };
        ApiError::Network(format!("{} (kind: {})", e, kind))
    }
}

/// Truncate a response body to avoid carrying excessive data
pub(crate) fn truncate_body(body: &str) -> String {
    let total = body.chars().count();
    if total <= MAX_ERROR_BODY_LENGTH {
        body.to_string()
    } else {
        let head: String = body.chars().take(MAX_ERROR_BODY_LENGTH).collect();
        format!("{}... (truncated, {} total chars)", head, total)
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ApiError::AuthRejected("token expired".to_string());
        assert_eq!(err.to_string(), "Authentication rejected: token expired");

        let err = ApiError::Status {
            status: 404,
            message: "no such course".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 404 - no such course");

        let err = ApiError::RefreshRejected {
            status: Some(403),
            message: "refresh token revoked".to_string(),
        };
        assert_eq!(err.to_string(), "Token refresh failed: refresh token revoked");
    }

    #[test]
    fn test_from_status_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, "expired");
        assert_eq!(err, ApiError::AuthRejected("expired".to_string()));
    }

    #[test]
    fn test_from_status_other() {
        let err = ApiError::from_status(StatusCode::FORBIDDEN, "moderators only");
        assert_eq!(
            err,
            ApiError::Status {
                status: 403,
                message: "moderators only".to_string()
            }
        );

        let err = ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn test_truncate_body() {
        let short = "short body";
        assert_eq!(truncate_body(short), short);

        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 510 total chars)"));
    }

    #[test]
    fn test_truncate_body_multibyte() {
        // Must not split inside a UTF-8 sequence
        let long = "ё".repeat(MAX_ERROR_BODY_LENGTH + 1);
        let truncated = truncate_body(&long);
        assert!(truncated.starts_with(&"ё".repeat(MAX_ERROR_BODY_LENGTH)));
    }

    #[test]
    fn test_requires_login() {
        assert!(ApiError::AuthRejected(String::new()).requires_login());
        assert!(ApiError::RetryExhausted(String::new()).requires_login());
        assert!(ApiError::RefreshRejected {
            status: None,
            message: String::new()
        }
        .requires_login());
        assert!(!ApiError::Network("reset".to_string()).requires_login());
        assert!(!ApiError::Status {
            status: 500,
            message: String::new()
        }
        .requires_login());
    }

    #[test]
    fn test_status_accessor() {
        assert_eq!(ApiError::RetryExhausted(String::new()).status(), Some(401));
        assert_eq!(ApiError::RefreshCancelled.status(), None);
        assert_eq!(ApiError::Storage("locked".to_string()).status(), None);
    }
}
