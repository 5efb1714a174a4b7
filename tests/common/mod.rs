// Not every test binary exercises every helper or fake handle.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    Router,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_checkout::{
    config::AppConfig,
    events::{self, EventSender},
    integrations::memory::{
        FlatRateShipping, InMemoryAddressDirectory, InMemoryCart, InMemoryGateway, InMemoryOrders,
        InMemoryVouchers, InMemoryWarehouse,
    },
    models::{CartItem, CartSnapshot, ContactInfo, PaymentMethod},
    recovery::InMemoryRecoveryStore,
    services::{
        AddressResolver, CheckoutSagaCoordinator, PaymentReturnReconciler, ShippingFeeQuoter,
        VoucherValidator,
    },
    AppState,
};

/// Harness wiring the coordinator and reconciler over in-memory
/// collaborators, with handles kept so tests can flip failure switches and
/// observe side effects.
pub struct TestApp {
    pub config: Arc<AppConfig>,
    pub coordinator: Arc<CheckoutSagaCoordinator>,
    pub reconciler: Arc<PaymentReturnReconciler>,
    pub cart: Arc<InMemoryCart>,
    pub directory: Arc<InMemoryAddressDirectory>,
    pub warehouse: Arc<InMemoryWarehouse>,
    pub rates: Arc<FlatRateShipping>,
    pub vouchers: Arc<InMemoryVouchers>,
    pub orders: Arc<InMemoryOrders>,
    pub gateway: Arc<InMemoryGateway>,
    pub recovery: Arc<InMemoryRecoveryStore>,
    pub user_id: Uuid,
    resolver: AddressResolver,
    events: EventSender,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = Arc::new(AppConfig::default());
        let (event_tx, event_rx) = mpsc::channel(256);
        let events = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let cart = Arc::new(InMemoryCart::new());
        let directory = Arc::new(InMemoryAddressDirectory::new());
        let warehouse = Arc::new(InMemoryWarehouse::new());
        let rates = Arc::new(FlatRateShipping::new(dec!(20000), dec!(5000)));
        let vouchers = Arc::new(InMemoryVouchers::new());
        let orders = Arc::new(InMemoryOrders::new());
        let gateway = Arc::new(InMemoryGateway::new());
        let recovery = Arc::new(InMemoryRecoveryStore::new());

        let resolver = AddressResolver::new(directory.clone());
        let quoter = ShippingFeeQuoter::new(
            warehouse.clone(),
            rates.clone(),
            config.fallback_shipping_fee,
            config.free_shipping_threshold,
        );
        let validator = VoucherValidator::new(vouchers.clone());

        let coordinator = Arc::new(CheckoutSagaCoordinator::new(
            config.clone(),
            cart.clone(),
            resolver.clone(),
            quoter,
            validator,
            orders.clone(),
            gateway.clone(),
            recovery.clone(),
            events.clone(),
        ));
        let reconciler = Arc::new(PaymentReturnReconciler::new(
            config.clone(),
            orders.clone(),
            cart.clone(),
            recovery.clone(),
            events.clone(),
        ));

        Self {
            config,
            coordinator,
            reconciler,
            cart,
            directory,
            warehouse,
            rates,
            vouchers,
            orders,
            gateway,
            recovery,
            user_id: Uuid::new_v4(),
            resolver,
            events,
            _event_task: event_task,
        }
    }

    /// Seeds a single-line cart with the given subtotal and weight.
    pub fn seed_cart(&self, subtotal: Decimal, weight_grams: u32) {
        self.cart.seed(
            self.user_id,
            CartSnapshot {
                cart_id: Uuid::new_v4(),
                items: vec![CartItem {
                    product_id: Uuid::new_v4(),
                    name: "Ceramic teapot".to_string(),
                    quantity: 1,
                    unit_price: subtotal,
                    weight_grams,
                }],
                subtotal,
            },
        );
    }

    /// Enters checkout and expects a new session to start.
    pub async fn start_session(&self) -> Uuid {
        match self
            .coordinator
            .enter(self.user_id)
            .await
            .expect("enter checkout")
        {
            storefront_checkout::services::checkout::EntryDecision::Started { session_id } => {
                session_id
            }
            other => panic!("expected a started session, got {:?}", other),
        }
    }

    /// Fills contact details and selects the R01 > R01-D1 > R01-D1-W1
    /// destination from the seeded directory.
    pub async fn fill_address(&self, session_id: Uuid) {
        self.coordinator
            .set_contact(
                session_id,
                ContactInfo {
                    full_name: "Nguyen Van A".to_string(),
                    phone: "0900000001".to_string(),
                    email: "buyer@example.com".to_string(),
                    address_line: "12 Hang Gai".to_string(),
                },
            )
            .await
            .expect("set contact");
        self.coordinator
            .select_region(session_id, "R01")
            .await
            .expect("select region");
        self.coordinator
            .select_sub_region(session_id, "R01-D1")
            .await
            .expect("select sub-region");
        self.coordinator
            .select_locality(session_id, "R01-D1-W1")
            .await
            .expect("select locality");
    }

    /// Runs a session up to the payment step with the given method selected.
    pub async fn session_at_payment(&self, method: PaymentMethod) -> Uuid {
        let session_id = self.start_session().await;
        self.fill_address(session_id).await;
        self.coordinator
            .advance_to_payment(session_id)
            .await
            .expect("advance to payment");
        self.coordinator
            .select_payment_method(session_id, method, None)
            .await
            .expect("select payment method");
        session_id
    }

    /// Full application router over this harness's state.
    pub fn router(&self) -> Router {
        storefront_checkout::app_router(Arc::new(AppState {
            config: self.config.clone(),
            coordinator: self.coordinator.clone(),
            reconciler: self.reconciler.clone(),
            resolver: self.resolver.clone(),
            events: self.events.clone(),
        }))
    }

    /// Sends a request against the router and returns the response.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request"),
        };
        self.router().oneshot(request).await.expect("response")
    }
}
