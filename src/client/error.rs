//! Client errors and user-facing error reporting

use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;

/// Error returned by [`ApiClient`](super::ApiClient) calls
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server could not be reached; no response was received
    #[error("Connection failed: {0}")]
    Connection(#[source] reqwest::Error),

    /// The server answered with a non-success status
    #[error("{message} ({status})")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    /// The refresh token was rejected; the stored session was cleared
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Building the HTTP client or decoding a response body failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The token store could not persist or clear tokens
    #[error("Token store error: {0}")]
    Store(String),
}

impl ClientError {
    /// HTTP status for API errors
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Machine readable error code sent by the server (e.g. `USER_LOCKED`)
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Turn a failed response into an error, keeping the server's code
    /// and message when the body is the standard error envelope.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        #[derive(Deserialize)]
        struct Envelope {
            error: Detail,
        }
        #[derive(Deserialize)]
        struct Detail {
            code: String,
            message: String,
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<Envelope>(&body) {
            Ok(envelope) => ClientError::Api {
                status,
                code: envelope.error.code,
                message: envelope.error.message,
            },
            Err(_) => ClientError::Api {
                status,
                code: format!("HTTP_{}", status.as_u16()),
                message: if body.trim().is_empty() {
                    status.canonical_reason().unwrap_or("Request failed").to_string()
                } else {
                    body
                },
            },
        }
    }
}

/// Categories of failures shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// No response from the server
    ConnectionFailed,
    /// Status 500 and above
    ServerError,
    NotFound,
    Forbidden,
    /// 401 without a refresh token to recover with
    NotLoggedIn,
    /// The refresh token was rejected
    SessionExpired,
}

impl ErrorCategory {
    /// Category for an error status, if it is one that gets reported.
    /// 401 is handled by the refresh logic and never maps here.
    pub fn for_status(status: StatusCode) -> Option<Self> {
        match status {
            s if s.is_server_error() => Some(ErrorCategory::ServerError),
            StatusCode::NOT_FOUND => Some(ErrorCategory::NotFound),
            StatusCode::FORBIDDEN => Some(ErrorCategory::Forbidden),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCategory::ConnectionFailed => "Cannot reach the server",
            ErrorCategory::ServerError => "Server error, please try again later",
            ErrorCategory::NotFound => "The requested resource was not found",
            ErrorCategory::Forbidden => "You do not have permission to do that",
            ErrorCategory::NotLoggedIn => "Please log in to continue",
            ErrorCategory::SessionExpired => "Your session has expired, please log in again",
        };
        f.write_str(text)
    }
}

/// Receives failures meant for the user (the equivalent of a toast)
pub trait ErrorReporter: Send + Sync {
    fn report(&self, category: ErrorCategory, detail: &str);
}

/// Default reporter; writes reports to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, category: ErrorCategory, detail: &str) {
        tracing::warn!("{}: {}", category, detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_for_status() {
        assert_eq!(
            ErrorCategory::for_status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::for_status(StatusCode::BAD_GATEWAY),
            Some(ErrorCategory::ServerError)
        );
        assert_eq!(
            ErrorCategory::for_status(StatusCode::NOT_FOUND),
            Some(ErrorCategory::NotFound)
        );
        assert_eq!(
            ErrorCategory::for_status(StatusCode::FORBIDDEN),
            Some(ErrorCategory::Forbidden)
        );
        assert_eq!(ErrorCategory::for_status(StatusCode::UNAUTHORIZED), None);
        assert_eq!(ErrorCategory::for_status(StatusCode::CONFLICT), None);
    }

    #[test]
    fn test_api_error_accessors() {
        let err = ClientError::Api {
            status: StatusCode::FORBIDDEN,
            code: "USER_LOCKED".to_string(),
            message: "Account is locked".to_string(),
        };
        assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(err.code(), Some("USER_LOCKED"));
        assert_eq!(err.to_string(), "Account is locked (403 Forbidden)");

        assert_eq!(ClientError::SessionExpired.status(), None);
        assert_eq!(ClientError::SessionExpired.code(), None);
    }
}
