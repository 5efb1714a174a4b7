//! Payment return reconciliation.
//!
//! Consumes the gateway's return parameters (or a direct COD
//! confirmation), decides success or failure, compensates failures by
//! cancelling the referenced order, and produces the settled view. The
//! cart is cleared exactly once per order; duplicate return events are
//! absorbed by a latch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::CheckoutError;
use crate::events::{Event, EventSender};
use crate::integrations::{CartApi, OrderApi};
use crate::models::{CheckoutOutcome, Order, OrderStatus};
use crate::pricing::{self, PriceBreakdown};
use crate::recovery::RecoveryStore;

/// Reason attached to the compensating cancel.
const CANCEL_REASON: &str = "payment failed/cancelled";

/// Parameters carried back by the gateway's return navigation.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayReturn {
    pub order_number: String,
    pub response_code: String,
    #[serde(default)]
    pub transaction_no: Option<String>,
}

/// The settled outcome plus, on success, the order and its recomputed
/// price breakdown for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SettledView {
    pub outcome: CheckoutOutcome,
    pub order: Option<Order>,
    pub breakdown: Option<PriceBreakdown>,
}

pub struct PaymentReturnReconciler {
    config: Arc<AppConfig>,
    orders: Arc<dyn OrderApi>,
    cart: Arc<dyn CartApi>,
    recovery: Arc<dyn RecoveryStore>,
    events: EventSender,
    /// Order numbers whose cart has already been cleared, with the time of
    /// the clear so settled entries can be aged out.
    cleared: DashMap<String, DateTime<Utc>>,
}

impl PaymentReturnReconciler {
    pub fn new(
        config: Arc<AppConfig>,
        orders: Arc<dyn OrderApi>,
        cart: Arc<dyn CartApi>,
        recovery: Arc<dyn RecoveryStore>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            orders,
            cart,
            recovery,
            events,
            cleared: DashMap::new(),
        }
    }

    /// Recovery check run on load, before rendering anything: a surviving
    /// pending-redirect marker means the external hop was interrupted and
    /// must be re-issued.
    pub async fn pending_redirect(&self, user_id: Uuid) -> Option<String> {
        self.recovery.pending_redirect(user_id).await
    }

    /// Handles the gateway's return navigation.
    #[instrument(skip(self), fields(order_number = %ret.order_number))]
    pub async fn handle_gateway_return(
        &self,
        user_id: Uuid,
        ret: GatewayReturn,
    ) -> Result<SettledView, CheckoutError> {
        // The return handler owns both markers from here on.
        self.recovery.clear_pending_redirect(user_id).await;

        if ret.response_code == self.config.gateway_success_code {
            self.settle_success(user_id, &ret.order_number, None).await
        } else {
            self.settle_failure(user_id, &ret).await
        }
    }

    /// Direct COD confirmation: a settled view for an order that never
    /// left for the gateway.
    #[instrument(skip(self))]
    pub async fn confirm_cod(
        &self,
        user_id: Uuid,
        order_number: &str,
    ) -> Result<SettledView, CheckoutError> {
        self.settle_success(
            user_id,
            order_number,
            Some("Order placed, payment due on delivery"),
        )
        .await
    }

    async fn settle_success(
        &self,
        user_id: Uuid,
        order_number: &str,
        message: Option<&str>,
    ) -> Result<SettledView, CheckoutError> {
        // Idempotent read; safe to repeat on a re-render.
        let order = self.orders.get_by_number(order_number).await?;

        // The order's own state wins over the gateway's response code: a
        // success code replayed after a failure return must not render a
        // success view over a cancelled order or touch the cart.
        if order.status == OrderStatus::Cancelled {
            warn!(order_number, "success code received for a cancelled order");
            return Ok(SettledView {
                outcome: CheckoutOutcome::failure(
                    Some(order.order_number),
                    "Payment failed or was cancelled",
                ),
                order: None,
                breakdown: None,
            });
        }

        self.recovery.clear_ongoing_order(user_id).await;
        self.clear_cart_once(user_id, order_number).await;

        self.events
            .send_or_log(Event::PaymentSucceeded {
                order_number: order_number.to_string(),
            })
            .await;

        // Same breakdown function and inputs as at order creation, so the
        // rendered totals are bit-identical to the ones submitted.
        let breakdown = pricing::compute(
            Some(order.subtotal),
            Some(order.shipping_fee),
            Some(order.discount),
            self.config.tax_rate,
        );
        let outcome = CheckoutOutcome::success(
            order.order_number.clone(),
            order.payment_method.clone(),
            message.unwrap_or("Payment completed"),
        );
        Ok(SettledView {
            outcome,
            order: Some(order),
            breakdown: Some(breakdown),
        })
    }

    async fn settle_failure(
        &self,
        user_id: Uuid,
        ret: &GatewayReturn,
    ) -> Result<SettledView, CheckoutError> {
        info!(code = %ret.response_code, "gateway reported a non-success code");
        self.recovery.clear_ongoing_order(user_id).await;
        self.events
            .send_or_log(Event::PaymentFailed {
                order_number: ret.order_number.clone(),
            })
            .await;

        // Compensating cancel. Fire-and-forget: the failure view renders
        // regardless of whether the cancel call itself succeeds.
        match self.orders.cancel(&ret.order_number, CANCEL_REASON).await {
            Ok(()) => {
                self.events
                    .send_or_log(Event::OrderCancelled {
                        order_number: ret.order_number.clone(),
                        reason: CANCEL_REASON.to_string(),
                    })
                    .await;
            }
            Err(e) => {
                warn!(order_number = %ret.order_number, error = %e, "compensating cancel failed");
            }
        }

        Ok(SettledView {
            outcome: CheckoutOutcome::failure(
                Some(ret.order_number.clone()),
                "Payment failed or was cancelled",
            ),
            order: None,
            breakdown: None,
        })
    }

    /// Drops latch entries older than `max_age`. Duplicate gateway returns
    /// arrive within minutes of the original; entries past that window only
    /// take up space. Run periodically from the background sweeper.
    pub fn prune_cleared_latch(&self, max_age: chrono::Duration) {
        let now = Utc::now();
        self.cleared.retain(|_, cleared_at| now - *cleared_at <= max_age);
    }

    /// Clears the cart at most once per order; duplicate events are no-ops.
    async fn clear_cart_once(&self, user_id: Uuid, order_number: &str) {
        if self
            .cleared
            .insert(order_number.to_string(), Utc::now())
            .is_some()
        {
            return;
        }
        let cart_id = self.cart.fetch_cart(user_id).await.ok().map(|c| c.cart_id);
        if let Err(e) = self.cart.clear_cart(user_id).await {
            warn!(error = %e, "cart clear failed after settled payment");
            return;
        }
        if let Some(cart_id) = cart_id {
            self.events.send_or_log(Event::CartCleared { cart_id }).await;
        }
    }
}
