//! Centralized error types for the classroom streaming core.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error kinds using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error taxonomy for the classroom streaming core.
///
/// Variants map directly onto the error kinds named in the recording/room
/// contracts: a caller never needs more granularity than this to decide how
/// to react.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum CoreError {
    /// No usable credentials were presented at all.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// Principal lacks the capability to perform the requested action.
    /// Never logged together with the offer body.
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Session id, division id, or participant id absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// SDP offer malformed or lacks any recordable track.
    #[error("Bad offer: {0}")]
    BadOffer(String),

    /// Peer connection failed or a participant connection dropped.
    /// Recovered locally; not surfaced as an API error unless the session
    /// was already `Recording`.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The container writer could not finalize; the file may be partial.
    #[error("Encoder failure: {0}")]
    EncoderFailure(String),

    /// Invariant violation. Surfaced as 500-class; the session is forcibly closed.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns a machine-readable error code for API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Authorization(_) => "authorization_denied",
            Self::NotFound(_) => "not_found",
            Self::BadOffer(_) => "bad_offer",
            Self::Transport(_) => "transport_error",
            Self::EncoderFailure(_) => "encoder_failure",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadOffer(_) => StatusCode::BAD_REQUEST,
            Self::Transport(_) | Self::EncoderFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_maps_to_forbidden() {
        let err = CoreError::Authorization("cannot record division D".into());
        assert_eq!(err.code(), "authorization_denied");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = CoreError::NotFound("session abc".into());
        assert_eq!(err.code(), "not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn bad_offer_maps_to_400() {
        let err = CoreError::BadOffer("no m= lines".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthenticated_maps_to_401() {
        let err = CoreError::Unauthenticated("missing bearer token".into());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }
}
