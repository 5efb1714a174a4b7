//! In-memory collaborator implementations.
//!
//! Used to run the service locally without the surrounding storefront
//! systems, and by the integration tests. Each implementation carries a
//! failure switch so tests can exercise the saga's fallback and
//! compensation paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use url::Url;
use uuid::Uuid;

use super::{
    AddressDirectoryApi, CartApi, GatewayConfigCheck, OrderApi, PaymentGatewayApi,
    ShippingRateApi, VoucherApi, VoucherDecision, VoucherValidationRequest, WarehouseApi,
};
use crate::errors::CheckoutError;
use crate::models::{
    AddressOption, CartSnapshot, CreatedOrder, GeoCodes, Order, OrderPayload, OrderStatus,
    Voucher,
};

fn transport_err(service: &str) -> CheckoutError {
    CheckoutError::ExternalService(format!("{} is unreachable", service))
}

/// Cart service over a per-user map. Clearing is idempotent and counted so
/// tests can assert the at-most-once clear latch.
#[derive(Debug, Default)]
pub struct InMemoryCart {
    carts: DashMap<Uuid, CartSnapshot>,
    clear_calls: AtomicUsize,
}

impl InMemoryCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, user_id: Uuid, cart: CartSnapshot) {
        self.carts.insert(user_id, cart);
    }

    pub fn clear_calls(&self) -> usize {
        self.clear_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CartApi for InMemoryCart {
    async fn fetch_cart(&self, user_id: Uuid) -> Result<CartSnapshot, CheckoutError> {
        Ok(self
            .carts
            .get(&user_id)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| CartSnapshot {
                cart_id: Uuid::new_v4(),
                items: vec![],
                subtotal: Decimal::ZERO,
            }))
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<(), CheckoutError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        self.carts.remove(&user_id);
        Ok(())
    }
}

/// Address directory backed by a static three-level tree.
#[derive(Debug, Default)]
pub struct InMemoryAddressDirectory {
    failing: AtomicBool,
}

impl InMemoryAddressDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CheckoutError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(transport_err("address directory"))
        } else {
            Ok(())
        }
    }

    fn option(code: &str, name: &str) -> AddressOption {
        AddressOption {
            code: code.to_string(),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl AddressDirectoryApi for InMemoryAddressDirectory {
    async fn regions(&self) -> Result<Vec<AddressOption>, CheckoutError> {
        self.check()?;
        Ok(vec![
            Self::option("R01", "North Region"),
            Self::option("R02", "Central Region"),
            Self::option("R03", "South Region"),
        ])
    }

    async fn sub_regions(&self, region_code: &str) -> Result<Vec<AddressOption>, CheckoutError> {
        self.check()?;
        Ok(match region_code {
            "R01" => vec![
                Self::option("R01-D1", "Riverside District"),
                Self::option("R01-D2", "Old Quarter District"),
            ],
            "R02" => vec![Self::option("R02-D1", "Harbor District")],
            "R03" => vec![
                Self::option("R03-D1", "Market District"),
                Self::option("R03-D2", "Garden District"),
            ],
            _ => vec![],
        })
    }

    async fn localities(
        &self,
        sub_region_code: &str,
    ) -> Result<Vec<AddressOption>, CheckoutError> {
        self.check()?;
        Ok(match sub_region_code {
            "R01-D1" => vec![
                Self::option("R01-D1-W1", "Lakeside Ward"),
                Self::option("R01-D1-W2", "Bridge Ward"),
            ],
            "R01-D2" => vec![Self::option("R01-D2-W1", "Temple Ward")],
            "R02-D1" => vec![Self::option("R02-D1-W1", "Pier Ward")],
            "R03-D1" => vec![Self::option("R03-D1-W1", "Bazaar Ward")],
            "R03-D2" => vec![Self::option("R03-D2-W1", "Orchard Ward")],
            _ => vec![],
        })
    }
}

/// Warehouse lookup with a single default origin and optional per-product
/// overrides.
#[derive(Debug)]
pub struct InMemoryWarehouse {
    default_origin: GeoCodes,
    overrides: DashMap<Uuid, GeoCodes>,
    failing: AtomicBool,
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self {
            default_origin: GeoCodes {
                region: "R02".into(),
                sub_region: "R02-D1".into(),
                locality: "R02-D1-W1".into(),
            },
            overrides: DashMap::new(),
            failing: AtomicBool::new(false),
        }
    }
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_origin(&self, product_id: Uuid, origin: GeoCodes) {
        self.overrides.insert(product_id, origin);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl WarehouseApi for InMemoryWarehouse {
    async fn shipping_origin(&self, product_id: Uuid) -> Result<GeoCodes, CheckoutError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(transport_err("warehouse service"));
        }
        Ok(self
            .overrides
            .get(&product_id)
            .map(|o| o.value().clone())
            .unwrap_or_else(|| self.default_origin.clone()))
    }
}

/// Rate service charging a base fee plus a per-kilogram step.
#[derive(Debug)]
pub struct FlatRateShipping {
    base_fee: Decimal,
    per_kg: Decimal,
    failing: AtomicBool,
    return_zero: AtomicBool,
}

impl FlatRateShipping {
    pub fn new(base_fee: Decimal, per_kg: Decimal) -> Self {
        Self {
            base_fee,
            per_kg,
            failing: AtomicBool::new(false),
            return_zero: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes the next quotes come back as exactly 0, which the quoter
    /// treats the same as a failure.
    pub fn set_return_zero(&self, zero: bool) {
        self.return_zero.store(zero, Ordering::SeqCst);
    }
}

#[async_trait]
impl ShippingRateApi for FlatRateShipping {
    async fn quote(
        &self,
        _origin: &GeoCodes,
        _destination: &GeoCodes,
        weight_grams: u32,
    ) -> Result<Decimal, CheckoutError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(transport_err("shipping-rate service"));
        }
        if self.return_zero.load(Ordering::SeqCst) {
            return Ok(Decimal::ZERO);
        }
        let kilos = Decimal::from(weight_grams.div_ceil(1000).max(1));
        Ok(self.base_fee + self.per_kg * kilos)
    }
}

/// Voucher service over an in-memory voucher table, applying the window,
/// usage-limit and minimum-order rules.
#[derive(Debug, Default)]
pub struct InMemoryVouchers {
    vouchers: DashMap<String, Voucher>,
    failing: AtomicBool,
}

impl InMemoryVouchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, voucher: Voucher) {
        self.vouchers.insert(voucher.code.clone(), voucher);
    }

    pub fn remove(&self, code: &str) {
        self.vouchers.remove(code);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn reject(message: &str) -> VoucherDecision {
        VoucherDecision {
            accepted: false,
            discount_amount: Decimal::ZERO,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl VoucherApi for InMemoryVouchers {
    async fn validate(
        &self,
        request: &VoucherValidationRequest,
    ) -> Result<VoucherDecision, CheckoutError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(transport_err("voucher service"));
        }

        let Some(voucher) = self.vouchers.get(&request.code) else {
            return Ok(Self::reject("Voucher does not exist"));
        };
        let voucher = voucher.value();

        if !voucher.is_active(Utc::now()) {
            return Ok(Self::reject("Voucher is expired or not yet active"));
        }
        if voucher.usage_exhausted() {
            return Ok(Self::reject("Voucher has reached its usage limit"));
        }
        if request.subtotal < voucher.min_order_amount {
            return Ok(Self::reject(
                "Order does not meet the minimum amount for this voucher",
            ));
        }

        Ok(VoucherDecision {
            accepted: true,
            discount_amount: voucher.discount_for(request.subtotal),
            message: "Voucher applied".to_string(),
        })
    }
}

/// Order service over an in-memory order table, keyed by order number.
#[derive(Debug, Default)]
pub struct InMemoryOrders {
    orders: DashMap<String, Order>,
    cancel_reasons: DashMap<String, String>,
    failing: AtomicBool,
    hanging: AtomicBool,
}

impl InMemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes `create` stall long enough to trip any caller-side timeout.
    pub fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    /// Reason recorded for a compensating cancel, if one ran.
    pub fn cancel_reason(&self, order_number: &str) -> Option<String> {
        self.cancel_reasons
            .get(order_number)
            .map(|r| r.value().clone())
    }

    pub fn order(&self, order_number: &str) -> Option<Order> {
        self.orders.get(order_number).map(|o| o.value().clone())
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub fn order_numbers(&self) -> Vec<String> {
        self.orders.iter().map(|o| o.key().clone()).collect()
    }
}

#[async_trait]
impl OrderApi for InMemoryOrders {
    async fn create(&self, payload: &OrderPayload) -> Result<CreatedOrder, CheckoutError> {
        if self.hanging.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CheckoutError::ExternalService(
                "Order could not be created, please try again".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let order_number = format!("ORD-{}", id.to_string()[..8].to_uppercase());
        let order = Order {
            id,
            order_number: order_number.clone(),
            user_id: payload.user_id,
            status: OrderStatus::PendingPayment,
            items: payload.items.clone(),
            shipping_address: payload.shipping_address.clone(),
            payment_method: payload.payment_method.clone(),
            shipping_fee: payload.shipping_fee,
            subtotal: payload.subtotal,
            tax: payload.tax,
            discount: payload.discount,
            total: payload.total,
            note: payload.note.clone(),
            created_at: Utc::now(),
        };
        self.orders.insert(order_number.clone(), order);
        Ok(CreatedOrder { id, order_number })
    }

    async fn get_by_number(&self, order_number: &str) -> Result<Order, CheckoutError> {
        self.orders
            .get(order_number)
            .map(|o| o.value().clone())
            .ok_or_else(|| CheckoutError::NotFound(format!("Order {} not found", order_number)))
    }

    async fn cancel(&self, order_number: &str, reason: &str) -> Result<(), CheckoutError> {
        let mut order = self.orders.get_mut(order_number).ok_or_else(|| {
            CheckoutError::NotFound(format!("Order {} not found", order_number))
        })?;
        order.status = OrderStatus::Cancelled;
        // The owning order system restores inventory here.
        self.cancel_reasons
            .insert(order_number.to_string(), reason.to_string());
        Ok(())
    }
}

/// Gateway integration returning a synthetic hosted-payment URL.
#[derive(Debug)]
pub struct InMemoryGateway {
    base_url: String,
    config_warning: DashMap<(), String>,
    config_failing: AtomicBool,
    redirect_failing: AtomicBool,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self {
            base_url: "https://pay.example/checkout".to_string(),
            config_warning: DashMap::new(),
            config_failing: AtomicBool::new(false),
            redirect_failing: AtomicBool::new(false),
        }
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_config_warning(&self, warning: Option<String>) {
        match warning {
            Some(w) => {
                self.config_warning.insert((), w);
            }
            None => {
                self.config_warning.remove(&());
            }
        }
    }

    pub fn set_config_failing(&self, failing: bool) {
        self.config_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_redirect_failing(&self, failing: bool) {
        self.redirect_failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGatewayApi for InMemoryGateway {
    async fn validate_config(&self) -> Result<GatewayConfigCheck, CheckoutError> {
        if self.config_failing.load(Ordering::SeqCst) {
            return Err(transport_err("payment gateway"));
        }
        let warning = self.config_warning.get(&()).map(|w| w.value().clone());
        Ok(GatewayConfigCheck {
            ok: warning.is_none(),
            warning,
        })
    }

    async fn create_redirect(&self, order_id: Uuid) -> Result<String, CheckoutError> {
        if self.redirect_failing.load(Ordering::SeqCst) {
            return Err(CheckoutError::ExternalService(
                "Could not create a payment redirect".to_string(),
            ));
        }
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CheckoutError::Internal(format!("bad gateway base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("ref", &order_id.to_string());
        Ok(url.into())
    }
}
