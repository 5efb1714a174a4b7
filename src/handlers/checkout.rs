//! Checkout session endpoints.
//!
//! The caller identity comes from the auth layer in front of this
//! service; handlers take the resolved `user_id` directly.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::errors::CheckoutError;
use crate::handlers::{created_response, success_response, validate_input};
use crate::models::{ContactInfo, Gateway, PaymentMethod};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(enter_checkout))
        .route("/addresses", get(saved_addresses))
        .route("/options/regions", get(list_regions))
        .route("/options/regions/:region/sub-regions", get(list_sub_regions))
        .route(
            "/options/sub-regions/:sub_region/localities",
            get(list_localities),
        )
        .route("/preferences/notifications", put(set_notification_pref))
        .route("/:session_id", get(get_session).delete(discard_session))
        .route("/:session_id/contact", put(set_contact))
        .route("/:session_id/note", put(set_note))
        .route("/:session_id/region", put(select_region))
        .route("/:session_id/sub-region", put(select_sub_region))
        .route("/:session_id/locality", put(select_locality))
        .route("/:session_id/quote", post(refresh_quote))
        .route(
            "/:session_id/voucher",
            post(apply_voucher).delete(remove_voucher),
        )
        .route("/:session_id/advance", post(advance_to_payment))
        .route("/:session_id/payment-method", put(select_payment_method))
        .route("/:session_id/place-order", post(place_order))
}

#[derive(Debug, Deserialize)]
struct UserScoped {
    user_id: Uuid,
}

async fn enter_checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserScoped>,
) -> Result<impl IntoResponse, CheckoutError> {
    let decision = state.coordinator.enter(payload.user_id).await?;
    Ok(created_response(decision))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    let session = state.coordinator.session(session_id).await?;
    Ok(success_response(session))
}

async fn discard_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    state.coordinator.discard(session_id).await?;
    Ok(success_response(serde_json::json!({ "discarded": true })))
}

async fn list_regions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, CheckoutError> {
    Ok(success_response(state.resolver.regions().await))
}

async fn list_sub_regions(
    State(state): State<Arc<AppState>>,
    Path(region): Path<String>,
) -> Result<impl IntoResponse, CheckoutError> {
    Ok(success_response(state.resolver.sub_regions(&region).await))
}

async fn list_localities(
    State(state): State<Arc<AppState>>,
    Path(sub_region): Path<String>,
) -> Result<impl IntoResponse, CheckoutError> {
    Ok(success_response(state.resolver.localities(&sub_region).await))
}

#[derive(Debug, Deserialize, Validate)]
struct ContactRequest {
    #[validate(length(min = 1))]
    full_name: String,
    #[validate(length(min = 1))]
    phone: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    address_line: String,
}

async fn set_contact(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<ContactRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    validate_input(&payload)?;
    state
        .coordinator
        .set_contact(
            session_id,
            ContactInfo {
                full_name: payload.full_name,
                phone: payload.phone,
                email: payload.email,
                address_line: payload.address_line,
            },
        )
        .await?;
    Ok(success_response(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize)]
struct NoteRequest {
    note: Option<String>,
}

async fn set_note(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<NoteRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    state.coordinator.set_note(session_id, payload.note).await?;
    Ok(success_response(serde_json::json!({ "updated": true })))
}

#[derive(Debug, Deserialize, Validate)]
struct CodeRequest {
    #[validate(length(min = 1))]
    code: String,
}

async fn select_region(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CodeRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    validate_input(&payload)?;
    let session = state
        .coordinator
        .select_region(session_id, &payload.code)
        .await?;
    Ok(success_response(session))
}

async fn select_sub_region(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CodeRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    validate_input(&payload)?;
    let session = state
        .coordinator
        .select_sub_region(session_id, &payload.code)
        .await?;
    Ok(success_response(session))
}

async fn select_locality(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CodeRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    validate_input(&payload)?;
    let session = state
        .coordinator
        .select_locality(session_id, &payload.code)
        .await?;
    Ok(success_response(session))
}

async fn refresh_quote(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    let fee = state.coordinator.refresh_quote(session_id).await?;
    Ok(success_response(serde_json::json!({ "shipping_fee": fee })))
}

async fn apply_voucher(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CodeRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    let applied = state
        .coordinator
        .apply_voucher(session_id, &payload.code)
        .await?;
    Ok(success_response(applied))
}

async fn remove_voucher(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    state.coordinator.remove_voucher(session_id).await?;
    Ok(success_response(serde_json::json!({ "removed": true })))
}

async fn advance_to_payment(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    state.coordinator.advance_to_payment(session_id).await?;
    Ok(success_response(serde_json::json!({ "step": "PAYMENT" })))
}

#[derive(Debug, Deserialize)]
struct PaymentMethodRequest {
    method: PaymentMethod,
    gateway: Option<Gateway>,
}

async fn select_payment_method(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<PaymentMethodRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    state
        .coordinator
        .select_payment_method(session_id, payload.method, payload.gateway)
        .await?;
    Ok(success_response(serde_json::json!({ "selected": true })))
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, CheckoutError> {
    let result = state.coordinator.place_order(session_id).await?;
    Ok(success_response(result))
}

async fn saved_addresses(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserScoped>,
) -> Result<impl IntoResponse, CheckoutError> {
    Ok(success_response(
        state.coordinator.saved_addresses(query.user_id).await,
    ))
}

#[derive(Debug, Deserialize)]
struct NotificationPrefRequest {
    user_id: Uuid,
    muted: bool,
}

async fn set_notification_pref(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NotificationPrefRequest>,
) -> Result<impl IntoResponse, CheckoutError> {
    state
        .coordinator
        .set_notifications_muted(payload.user_id, payload.muted)
        .await;
    Ok(success_response(serde_json::json!({ "muted": payload.muted })))
}
