//! Storefront checkout saga service.
//!
//! Turns a cart into a paid order across address resolution, shipping-fee
//! quotation, voucher validation, order creation and payment-gateway
//! handoff, with recovery markers covering interruption and a reconciler
//! settling the gateway's asynchronous return.
//!
//! The surrounding storefront systems (cart, catalog, address directory,
//! warehouse, vouchers, orders, payment gateway) are consumed through the
//! trait contracts in [`integrations`].

pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod integrations;
pub mod models;
pub mod pricing;
pub mod recovery;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::services::{AddressResolver, CheckoutSagaCoordinator, PaymentReturnReconciler};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<CheckoutSagaCoordinator>,
    pub reconciler: Arc<PaymentReturnReconciler>,
    pub resolver: AddressResolver,
    pub events: EventSender,
}

/// Builds the full application router.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async {
                Json(serde_json::json!({
                    "status": "healthy",
                    "service": "storefront-checkout"
                }))
            }),
        )
        .nest("/api/v1/checkout", handlers::checkout::routes())
        .nest("/api/v1/payment", handlers::payment::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .with_state(state)
}
