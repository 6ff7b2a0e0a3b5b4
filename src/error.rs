//! Unified error handling for waymark.
//!
//! The router is the single point that translates an error value into an
//! HTTP response: handlers return [`Error`], and [`Error::status_code`]
//! decides the response status. Errors that carry an explicit status map
//! to it; everything else collapses to 500.

use http::StatusCode;
use thiserror::Error;

pub use crate::session::SessionError;

/// Boxed error type accepted from application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can escape a handler chain.
#[derive(Debug, Error)]
pub enum Error {
    /// An error with an explicit HTTP status. Produced by the fallback
    /// handlers (404/405) and by application handlers that want a
    /// specific response status.
    #[error("{message}")]
    Status {
        status: StatusCode,
        message: String,
    },

    /// Session subsystem failure (token, codec or store).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Request token did not match the session CSRF token.
    #[error("csrf token mismatch")]
    CsrfMismatch,

    /// Anything else from application code.
    #[error(transparent)]
    Other(#[from] BoxError),
}

impl Error {
    /// Create an error carrying an explicit HTTP status, with the
    /// canonical reason phrase as its message.
    pub fn status(status: StatusCode) -> Self {
        Error::Status {
            message: status.canonical_reason().unwrap_or("error").to_string(),
            status,
        }
    }

    /// Create an error carrying an explicit HTTP status and message.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Status {
            status,
            message: message.into(),
        }
    }

    /// 404 error produced when no route matches a request.
    pub fn not_found() -> Self {
        Error::status(StatusCode::NOT_FOUND)
    }

    /// The HTTP status this error maps to. Errors without an explicit
    /// status are internal failures and collapse to 500.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Status { status, .. } => *status,
            Error::Session(_) | Error::CsrfMismatch | Error::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_maps_to_its_code() {
        let err = Error::with_status(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(err.status_code(), StatusCode::IM_A_TEAPOT);
        assert_eq!(err.to_string(), "short and stout");
    }

    #[test]
    fn test_plain_errors_collapse_to_500() {
        let err: Error = Box::<dyn std::error::Error + Send + Sync>::from("boom").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            Error::CsrfMismatch.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_uses_reason_phrase() {
        let err = Error::not_found();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Not Found");
    }
}
