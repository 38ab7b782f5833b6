//! API error taxonomy.
//!
//! Failures are classified the way the recovery and notification layers
//! route on them: transport failures (no response received), non-success
//! statuses carrying a server message, and decode failures. None of these
//! are fatal; callers degrade and keep running.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the Clementine backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure (connection refused, timeout, bad URL).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code of the response.
        status: StatusCode,
        /// Server-provided message, or the raw body when none was given.
        message: String,
    },

    /// Response body could not be decoded.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ApiError {
    /// Status code of the response, when one was received.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(err) => err.status(),
            Self::Status { status, .. } => Some(*status),
            Self::Parse(_) => None,
        }
    }

    /// True for a 401 response.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// True when no response was received at all.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Http(err) if err.status().is_none())
    }

    /// Message suitable for the notification sink.
    ///
    /// Prefers the server-provided message; transport failures collapse to
    /// a generic connectivity hint, and a status response without a message
    /// gets a clean generic line rather than a raw status dump.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } if !message.is_empty() => message.clone(),
            Self::Status { .. } => "An unexpected error occurred. Please try again.".to_owned(),
            Self::Http(err) if err.status().is_none() => {
                "Network error: please check your internet connection.".to_owned()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_error(status: StatusCode, message: &str) -> ApiError {
        ApiError::Status {
            status,
            message: message.to_owned(),
        }
    }

    #[test]
    fn test_status_error_display() {
        let err = status_error(StatusCode::BAD_REQUEST, "Invalid coupon");
        assert_eq!(err.to_string(), "server returned 400 Bad Request: Invalid coupon");
    }

    #[test]
    fn test_is_unauthorized() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "expired").is_unauthorized());
        assert!(!status_error(StatusCode::FORBIDDEN, "nope").is_unauthorized());
    }

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = status_error(StatusCode::CONFLICT, "Username already exists");
        assert_eq!(err.user_message(), "Username already exists");
    }

    #[test]
    fn test_user_message_empty_body_falls_back_to_generic() {
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(
            err.user_message(),
            "An unexpected error occurred. Please try again."
        );
    }

    #[test]
    fn test_parse_error_is_not_connectivity() {
        let parse: ApiError = serde_json::from_str::<u32>("{").unwrap_err().into();
        assert!(!parse.is_connectivity());
        assert_eq!(parse.status(), None);
    }
}
