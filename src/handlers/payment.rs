//! Payment return and recovery endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::handlers::success_response;
use crate::services::reconciler::GatewayReturn;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/return", get(gateway_return))
        .route("/cod/:order_number", get(confirm_cod))
        .route("/pending-redirect", get(pending_redirect))
}

#[derive(Debug, Deserialize)]
struct GatewayReturnQuery {
    user_id: Uuid,
    order_number: String,
    response_code: String,
    #[serde(default)]
    transaction_no: Option<String>,
}

/// Landing point for the gateway's return navigation.
async fn gateway_return(
    State(state): State<Arc<AppState>>,
    Query(query): Query<GatewayReturnQuery>,
) -> Result<impl IntoResponse, CheckoutError> {
    let view = state
        .reconciler
        .handle_gateway_return(
            query.user_id,
            GatewayReturn {
                order_number: query.order_number,
                response_code: query.response_code,
                transaction_no: query.transaction_no,
            },
        )
        .await?;
    Ok(success_response(view))
}

#[derive(Debug, Deserialize)]
struct UserScoped {
    user_id: Uuid,
}

/// Settled view for a COD order.
async fn confirm_cod(
    State(state): State<Arc<AppState>>,
    Path(order_number): Path<String>,
    Query(query): Query<UserScoped>,
) -> Result<impl IntoResponse, CheckoutError> {
    let view = state
        .reconciler
        .confirm_cod(query.user_id, &order_number)
        .await?;
    Ok(success_response(view))
}

/// Pre-render recovery check: a surviving pending-redirect marker means
/// the caller should immediately continue that redirect.
async fn pending_redirect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserScoped>,
) -> Result<impl IntoResponse, CheckoutError> {
    let url = state.reconciler.pending_redirect(query.user_id).await;
    Ok(success_response(serde_json::json!({ "url": url })))
}
