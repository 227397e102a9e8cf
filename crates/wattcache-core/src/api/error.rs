use thiserror::Error;

use crate::auth::AuthError;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl DispatchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        DispatchError::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    pub fn from_transport(error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            "timed out"
        } else if error.is_connect() {
            "connection failed"
        } else {
            "request failed"
        };
        DispatchError::Transport(format!("{}: {}", kind, error))
    }

    /// Only authentication and network failures are worth retrying.
    /// An HTTP error status is the server's answer and will not change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::Auth(_) | DispatchError::Transport(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            DispatchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = DispatchError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));
        assert_eq!(DispatchError::truncate_body("short"), "short");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        // Must not panic on a multi-byte boundary
        let truncated = DispatchError::truncate_body(&body);
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(DispatchError::Auth(AuthError::MissingCredentials).is_retryable());
        assert!(DispatchError::Transport("timed out".to_string()).is_retryable());
        let http = DispatchError::from_status(reqwest::StatusCode::NOT_FOUND, "nope");
        assert!(!http.is_retryable());
        assert_eq!(http.status_code(), Some(404));
    }
}
