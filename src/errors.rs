use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Error body returned by the HTTP surface.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Bad Request", "Bad Gateway").
    pub error: String,
    /// Human-readable description, server-sourced where available.
    pub message: String,
    /// ISO 8601 timestamp when the error occurred.
    pub timestamp: String,
}

/// Checkout error taxonomy.
///
/// Four classes, matching how each is recovered:
/// - validation errors are raised locally and block step advancement,
/// - soft external failures never become errors at all (callers fall back
///   to a default value and log a warning),
/// - hard external failures abort the current step but leave the session
///   resumable,
/// - post-hoc payment failures trigger compensation and terminate the saga
///   with a failure outcome rather than propagating.
///
/// Transport errors are converted at the boundary of each external call;
/// nothing propagates past the saga coordinator unhandled.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Checkout submission timed out")]
    SubmissionTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CheckoutError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::SubmissionTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Internal errors return a generic
    /// message instead of leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::Internal(_) => "Internal server error".to_string(),
            Self::SubmissionTimeout => {
                "Order submission timed out, please try again".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for CheckoutError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Error")
                .to_string(),
            message: self.response_message(),
            timestamp: Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            CheckoutError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CheckoutError::ExternalService("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            CheckoutError::SubmissionTimeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn internal_errors_stay_generic() {
        let msg = CheckoutError::Internal("connection pool exhausted".into()).response_message();
        assert_eq!(msg, "Internal server error");
    }
}
