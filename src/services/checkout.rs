//! The checkout saga coordinator.
//!
//! Orchestrates the whole cart-to-order flow: address collection, shipping
//! quotation, voucher application, order creation and dispatch to either
//! the payment gateway or COD. Recovery markers are written around the
//! risky steps so an interrupted submission can be detected after a
//! reload; an in-memory guard stops duplicate submissions within the same
//! session lifetime.
//!
//! Ordering guarantees: order creation happens-before payment dispatch,
//! and every recovery-marker write happens-before the redirect it guards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::CheckoutError;
use crate::events::{Event, EventSender};
use crate::integrations::{CartApi, OrderApi, PaymentGatewayApi};
use crate::models::{
    AddressSelection, AppliedVoucherDiscount, CartSnapshot, CheckoutOutcome, ContactInfo,
    Gateway, OrderLineItem, OrderPayload, PaymentMethod, RecoveryMarker, SavedAddress,
};
use crate::pricing;
use crate::recovery::RecoveryStore;
use crate::services::{AddressResolver, ShippingFeeQuoter, VoucherValidator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutStep {
    Address,
    Payment,
}

/// Ephemeral per-session checkout state. Created on entering checkout,
/// discarded when the saga reaches a terminal action.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cart: CartSnapshot,
    pub step: CheckoutStep,
    pub contact: ContactInfo,
    pub address: AddressSelection,
    pub payment_method: Option<PaymentMethod>,
    pub gateway: Option<Gateway>,
    /// At most one applied voucher at a time.
    pub voucher: Option<AppliedVoucherDiscount>,
    /// `None` until all destination levels are selected and a quote ran.
    pub shipping_fee: Option<Decimal>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Session state plus the in-flight submission guard. The guard lives
/// outside the mutex so a second place-order is rejected immediately
/// instead of queueing behind the first.
struct SessionHandle {
    in_flight: AtomicBool,
    state: Mutex<CheckoutSession>,
}

struct InFlightGuard(Arc<SessionHandle>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.store(false, Ordering::SeqCst);
    }
}

/// What the checkout entry point should do, decided before any session is
/// created. Both recovery markers are consulted first so a reload during
/// the external payment hop resumes instead of re-rendering.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryDecision {
    /// A pending redirect survived a reload; continue it immediately.
    ResumeRedirect { url: String },
    /// A fresh ongoing-order marker exists: a submission was interrupted
    /// mid-flight. Suppresses the empty-cart redirect.
    OngoingOrder { marker: RecoveryMarker },
    EmptyCart,
    Started { session_id: Uuid },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaceOrderResult {
    /// Hand control to the external payment page.
    Redirect { url: String },
    /// COD: no gateway hop, the saga is settled.
    Completed { outcome: CheckoutOutcome },
}

pub struct CheckoutSagaCoordinator {
    config: Arc<AppConfig>,
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    cart: Arc<dyn CartApi>,
    resolver: AddressResolver,
    shipping: ShippingFeeQuoter,
    vouchers: VoucherValidator,
    orders: Arc<dyn OrderApi>,
    gateway: Arc<dyn PaymentGatewayApi>,
    recovery: Arc<dyn RecoveryStore>,
    events: EventSender,
}

impl CheckoutSagaCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<AppConfig>,
        cart: Arc<dyn CartApi>,
        resolver: AddressResolver,
        shipping: ShippingFeeQuoter,
        vouchers: VoucherValidator,
        orders: Arc<dyn OrderApi>,
        gateway: Arc<dyn PaymentGatewayApi>,
        recovery: Arc<dyn RecoveryStore>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            sessions: DashMap::new(),
            cart,
            resolver,
            shipping,
            vouchers,
            orders,
            gateway,
            recovery,
            events,
        }
    }

    /// Checkout entry point.
    ///
    /// Order of checks matters: a pending redirect is re-issued before
    /// anything renders, and a fresh ongoing-order marker suppresses the
    /// empty-cart redirect even when the cart now appears empty. Stale
    /// markers are ignored here but not deleted; only a terminal outcome
    /// deletes them.
    #[instrument(skip(self))]
    pub async fn enter(&self, user_id: Uuid) -> Result<EntryDecision, CheckoutError> {
        if let Some(url) = self.recovery.pending_redirect(user_id).await {
            info!("pending redirect found, resuming external payment hop");
            return Ok(EntryDecision::ResumeRedirect { url });
        }

        // Independent, idempotent reads; issued concurrently.
        let (cart, regions) = futures::join!(self.cart.fetch_cart(user_id), self.resolver.regions());
        let cart = cart?;

        if let Some(marker) = self.recovery.ongoing_order(user_id).await {
            if !marker.is_stale(Utc::now(), self.config.marker_stale_age()) {
                info!(order_number = %marker.order_number, "ongoing order marker found");
                return Ok(EntryDecision::OngoingOrder { marker });
            }
        }

        if cart.is_empty() {
            return Ok(EntryDecision::EmptyCart);
        }

        let session_id = Uuid::new_v4();
        let session = CheckoutSession {
            id: session_id,
            user_id,
            cart,
            step: CheckoutStep::Address,
            contact: ContactInfo::default(),
            address: AddressSelection {
                region_options: regions,
                ..Default::default()
            },
            payment_method: None,
            gateway: None,
            voucher: None,
            shipping_fee: None,
            note: None,
            created_at: Utc::now(),
        };
        self.sessions.insert(
            session_id,
            Arc::new(SessionHandle {
                in_flight: AtomicBool::new(false),
                state: Mutex::new(session),
            }),
        );

        self.events
            .send_or_log(Event::CheckoutStarted {
                session_id,
                user_id,
            })
            .await;
        Ok(EntryDecision::Started { session_id })
    }

    /// Snapshot of the session for rendering.
    pub async fn session(&self, session_id: Uuid) -> Result<CheckoutSession, CheckoutError> {
        let handle = self.handle(session_id)?;
        let state = handle.state.lock().await;
        Ok(state.clone())
    }

    pub async fn set_contact(
        &self,
        session_id: Uuid,
        contact: ContactInfo,
    ) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        state.contact = contact;
        Ok(())
    }

    pub async fn set_note(&self, session_id: Uuid, note: Option<String>) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        state.note = note;
        Ok(())
    }

    pub async fn select_region(&self, session_id: Uuid, code: &str) -> Result<CheckoutSession, CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        self.resolver.select_region(&mut state.address, code).await?;
        self.requote(&mut state).await;
        Ok(state.clone())
    }

    pub async fn select_sub_region(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        self.resolver
            .select_sub_region(&mut state.address, code)
            .await?;
        self.requote(&mut state).await;
        Ok(state.clone())
    }

    pub async fn select_locality(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<CheckoutSession, CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        self.resolver
            .select_locality(&mut state.address, code)
            .await?;
        self.requote(&mut state).await;
        Ok(state.clone())
    }

    /// Explicit re-quote trigger, also exposed over the API.
    pub async fn refresh_quote(&self, session_id: Uuid) -> Result<Option<Decimal>, CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        self.requote(&mut state).await;
        Ok(state.shipping_fee)
    }

    /// Applies a voucher, replacing any previously applied one. On failure
    /// the previously applied voucher is left untouched.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn apply_voucher(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<AppliedVoucherDiscount, CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;

        let applied = self
            .vouchers
            .validate(code, state.user_id, &state.cart)
            .await?;
        state.voucher = Some(applied.clone());

        self.events
            .send_or_log(Event::VoucherApplied {
                session_id,
                code: applied.code.clone(),
                discount: applied.discount_amount,
            })
            .await;
        self.notify(state.user_id, &applied.message).await;
        Ok(applied)
    }

    /// Removes the applied voucher; the discount drops back to zero.
    pub async fn remove_voucher(&self, session_id: Uuid) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        if let Some(removed) = state.voucher.take() {
            self.events
                .send_or_log(Event::VoucherRemoved {
                    session_id,
                    code: removed.code,
                })
                .await;
        }
        Ok(())
    }

    /// Advances from the address step to the payment step.
    ///
    /// Requires all contact fields, a resolved region and locality, and a
    /// quoted shipping fee. If the fee is unresolved one quote attempt is
    /// forced before the advance is blocked.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn advance_to_payment(&self, session_id: Uuid) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;

        if !state.contact.is_complete() {
            return Err(CheckoutError::Validation(
                "All contact and address fields are required".to_string(),
            ));
        }
        if state.address.region.is_none() || state.address.locality.is_none() {
            return Err(CheckoutError::Validation(
                "Select a full shipping destination".to_string(),
            ));
        }
        if state.shipping_fee.is_none() {
            self.requote(&mut state).await;
        }
        if state.shipping_fee.is_none() {
            return Err(CheckoutError::Validation(
                "Shipping fee could not be resolved".to_string(),
            ));
        }

        state.step = CheckoutStep::Payment;
        Ok(())
    }

    pub async fn select_payment_method(
        &self,
        session_id: Uuid,
        method: PaymentMethod,
        gateway: Option<Gateway>,
    ) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;
        state.payment_method = Some(method);
        state.gateway = match method {
            PaymentMethod::CreditGateway => Some(gateway.unwrap_or(Gateway::Vnpay)),
            PaymentMethod::Cod => None,
        };
        Ok(())
    }

    /// Runs the submission saga, at most once concurrently per session.
    ///
    /// The whole submission runs under the configured timeout; hitting it
    /// abandons the awaited result (the operation may still complete
    /// server-side) and clears any recovery marker written during the
    /// attempt.
    pub async fn place_order(&self, session_id: Uuid) -> Result<PlaceOrderResult, CheckoutError> {
        let handle = self.handle(session_id)?;
        if handle
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CheckoutError::Conflict(
                "An order submission is already in flight".to_string(),
            ));
        }
        let _guard = InFlightGuard(handle.clone());

        let mut state = handle.state.lock().await;
        let user_id = state.user_id;

        let result = match tokio::time::timeout(
            self.config.submission_timeout(),
            self.submit(&mut state),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                self.recovery.clear_ongoing_order(user_id).await;
                Err(CheckoutError::SubmissionTimeout)
            }
        };
        drop(state);

        match &result {
            Ok(_) => {
                // Terminal action reached; the session is done.
                self.sessions.remove(&session_id);
            }
            Err(e) => {
                self.events
                    .send_or_log(Event::OrderSubmissionFailed {
                        session_id,
                        reason: e.to_string(),
                    })
                    .await;
                self.notify(user_id, &e.response_message()).await;
            }
        }
        result
    }

    /// Drops a session, for a buyer leaving checkout without placing an
    /// order. Rejected while a submission is in flight.
    pub async fn discard(&self, session_id: Uuid) -> Result<(), CheckoutError> {
        let handle = self.handle(session_id)?;
        if handle.in_flight.load(Ordering::SeqCst) {
            return Err(CheckoutError::Conflict(
                "An order submission is already in flight".to_string(),
            ));
        }
        self.sessions.remove(&session_id);
        Ok(())
    }

    /// Removes sessions older than `max_age`, skipping any with a
    /// submission in flight. Returns the number dropped. Run periodically
    /// from the background sweeper; abandoned checkouts would otherwise
    /// accumulate forever.
    pub fn sweep_expired_sessions(&self, max_age: chrono::Duration) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| {
            if handle.in_flight.load(Ordering::SeqCst) {
                return true;
            }
            match handle.state.try_lock() {
                Ok(state) => now - state.created_at <= max_age,
                // Locked means actively in use; keep it.
                Err(_) => true,
            }
        });
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            info!(removed, "dropped expired checkout sessions");
        }
        removed
    }

    pub async fn saved_addresses(&self, user_id: Uuid) -> Vec<SavedAddress> {
        self.recovery.saved_addresses(user_id).await
    }

    pub async fn set_notifications_muted(&self, user_id: Uuid, muted: bool) {
        self.recovery.set_notifications_muted(user_id, muted).await;
    }

    fn handle(&self, session_id: Uuid) -> Result<Arc<SessionHandle>, CheckoutError> {
        self.sessions
            .get(&session_id)
            .map(|h| h.value().clone())
            .ok_or_else(|| {
                CheckoutError::NotFound(format!("Checkout session {} not found", session_id))
            })
    }

    /// Re-quotes shipping when the destination is complete; otherwise the
    /// fee resets to unresolved.
    async fn requote(&self, state: &mut CheckoutSession) {
        match state.address.destination() {
            Some(destination) => {
                let quote = self.shipping.quote_for_cart(&state.cart, &destination).await;
                state.shipping_fee = Some(quote.fee);
                self.events
                    .send_or_log(Event::ShippingQuoted {
                        session_id: state.id,
                        fee: quote.fee,
                        fallback: quote.fallback,
                    })
                    .await;
            }
            None => state.shipping_fee = None,
        }
    }

    #[instrument(skip(self, state), fields(session_id = %state.id, user_id = %state.user_id))]
    async fn submit(
        &self,
        state: &mut CheckoutSession,
    ) -> Result<PlaceOrderResult, CheckoutError> {
        if state.step != CheckoutStep::Payment {
            return Err(CheckoutError::InvalidOperation(
                "Complete the address step before placing the order".to_string(),
            ));
        }
        let method = state.payment_method.ok_or_else(|| {
            CheckoutError::Validation("Select a payment method".to_string())
        })?;
        let shipping_fee = state.shipping_fee.ok_or_else(|| {
            CheckoutError::Validation("Shipping fee is not resolved".to_string())
        })?;

        // Credit-gateway selection maps to the single supported gateway
        // identifier; everything else is forwarded upper-cased.
        let effective_method = match method {
            PaymentMethod::CreditGateway => self.config.gateway_id.clone(),
            other => other.to_string(),
        };

        if method == PaymentMethod::CreditGateway {
            // Soft pre-flight check. A reported problem is a warning only;
            // a transport error on the check itself aborts via `?`.
            let check = self.gateway.validate_config().await?;
            if !check.ok {
                warn!(warning = ?check.warning, "gateway configuration check reported a problem");
            }
        }

        // Re-validate the applied voucher server-side instead of trusting
        // the discount cached at apply time.
        let voucher = match state.voucher.clone() {
            Some(applied) => {
                match self
                    .vouchers
                    .validate(&applied.code, state.user_id, &state.cart)
                    .await
                {
                    Ok(revalidated) => Some(revalidated),
                    Err(CheckoutError::Validation(msg)) => {
                        state.voucher = None;
                        return Err(CheckoutError::Validation(format!(
                            "Voucher {} is no longer valid: {}",
                            applied.code, msg
                        )));
                    }
                    Err(e) => {
                        warn!(error = %e, "voucher re-validation unavailable, keeping applied discount");
                        Some(applied)
                    }
                }
            }
            None => None,
        };
        state.voucher = voucher.clone();

        let breakdown = pricing::compute(
            Some(state.cart.subtotal),
            Some(shipping_fee),
            voucher.as_ref().map(|v| v.discount_amount),
            self.config.tax_rate,
        );
        let payload = OrderPayload {
            user_id: state.user_id,
            items: state
                .cart
                .items
                .iter()
                .map(|i| OrderLineItem {
                    product_id: i.product_id,
                    name: i.name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            shipping_address: flatten_shipping_address(&state.contact, &state.address),
            payment_method: effective_method.clone(),
            shipping_fee: breakdown.shipping_amount,
            subtotal: breakdown.subtotal,
            tax: breakdown.tax_amount,
            voucher_code: voucher.map(|v| v.code),
            discount: breakdown.discount_amount,
            total: breakdown.total_amount,
            note: state.note.clone(),
        };

        // Single creation call. On failure the session stays at the
        // payment step for retry.
        let created = self.orders.create(&payload).await?;
        info!(order_number = %created.order_number, "order created");
        self.events
            .send_or_log(Event::OrderCreated {
                order_id: created.id,
                order_number: created.order_number.clone(),
            })
            .await;

        // Written before any dispatch so a tab closed between creation and
        // payment is detectable on the next entry.
        let marker = RecoveryMarker {
            order_id: created.id,
            order_number: created.order_number.clone(),
            payment_method: effective_method.clone(),
            created_at: Utc::now(),
        };
        self.recovery.set_ongoing_order(state.user_id, &marker).await;

        self.remember_address(state).await;

        match method {
            PaymentMethod::Cod => {
                self.recovery.clear_ongoing_order(state.user_id).await;
                Ok(PlaceOrderResult::Completed {
                    outcome: CheckoutOutcome::success(
                        created.order_number,
                        effective_method,
                        "Order placed, payment due on delivery",
                    ),
                })
            }
            PaymentMethod::CreditGateway => {
                match self.gateway.create_redirect(created.id).await {
                    Ok(url) => {
                        // Redirect marker first, then drop the ongoing-order
                        // marker: from here the return handler owns recovery.
                        self.recovery.set_pending_redirect(state.user_id, &url).await;
                        self.recovery.clear_ongoing_order(state.user_id).await;
                        self.events
                            .send_or_log(Event::PaymentRedirectIssued {
                                order_number: created.order_number.clone(),
                            })
                            .await;
                        Ok(PlaceOrderResult::Redirect { url })
                    }
                    Err(e) => {
                        // The order stays PENDING_PAYMENT with no payment
                        // attempt in progress; it is not cancelled here.
                        self.recovery.clear_ongoing_order(state.user_id).await;
                        Err(CheckoutError::ExternalService(format!(
                            "Could not start the payment: {}",
                            e
                        )))
                    }
                }
            }
        }
    }

    async fn remember_address(&self, state: &CheckoutSession) {
        if let Some(destination) = state.address.destination() {
            self.recovery
                .push_saved_address(
                    state.user_id,
                    SavedAddress {
                        contact: state.contact.clone(),
                        destination,
                        saved_at: Utc::now(),
                    },
                )
                .await;
        }
    }

    async fn notify(&self, user_id: Uuid, message: &str) {
        if !self.recovery.notifications_muted(user_id).await {
            self.events
                .send_or_log(Event::Notification {
                    user_id,
                    message: message.to_string(),
                })
                .await;
        }
    }
}

/// Flattens the shipping address into a single line: address line +
/// locality + sub-region + region, comma-joined with empty segments
/// dropped.
pub fn flatten_shipping_address(contact: &ContactInfo, address: &AddressSelection) -> String {
    [
        Some(contact.address_line.as_str()),
        address.locality.as_ref().map(|o| o.name.as_str()),
        address.sub_region.as_ref().map(|o| o.name.as_str()),
        address.region.as_ref().map(|o| o.name.as_str()),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}
