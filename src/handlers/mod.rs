//! HTTP surface for the checkout flow.

pub mod checkout;
pub mod payment;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use validator::Validate;

use crate::errors::CheckoutError;

/// Wraps a payload in the `{ "data": … }` envelope.
pub fn success_response<T: Serialize>(data: T) -> impl IntoResponse {
    Json(serde_json::json!({ "data": data }))
}

pub fn created_response<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "data": data })),
    )
}

/// Runs request-body validation and converts failures into the local
/// validation error class.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), CheckoutError> {
    input
        .validate()
        .map_err(|e| CheckoutError::Validation(e.to_string()))
}
