//! Contracts for the external collaborators the checkout saga consumes.
//!
//! Each collaborator is an async trait injected as `Arc<dyn _>`. Only the
//! documented contract is modeled here; concrete transports live with the
//! owning systems. [`memory`] provides in-memory implementations used for
//! local development and tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::models::{
    AddressOption, CartSnapshot, CreatedOrder, GeoCodes, Order, OrderLineItem, OrderPayload,
};

pub mod memory;

/// Cart service: read the current cart, clear it after a paid order.
/// `clear_cart` is idempotent.
#[async_trait]
pub trait CartApi: Send + Sync {
    async fn fetch_cart(&self, user_id: Uuid) -> Result<CartSnapshot, CheckoutError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<(), CheckoutError>;
}

/// Address directory: region / sub-region / locality listings by parent
/// code.
#[async_trait]
pub trait AddressDirectoryApi: Send + Sync {
    async fn regions(&self) -> Result<Vec<AddressOption>, CheckoutError>;
    async fn sub_regions(&self, region_code: &str) -> Result<Vec<AddressOption>, CheckoutError>;
    async fn localities(&self, sub_region_code: &str)
        -> Result<Vec<AddressOption>, CheckoutError>;
}

/// Warehouse/inventory service: resolves the shipping origin for a product.
#[async_trait]
pub trait WarehouseApi: Send + Sync {
    async fn shipping_origin(&self, product_id: Uuid) -> Result<GeoCodes, CheckoutError>;
}

/// Shipping-rate service.
#[async_trait]
pub trait ShippingRateApi: Send + Sync {
    async fn quote(
        &self,
        origin: &GeoCodes,
        destination: &GeoCodes,
        weight_grams: u32,
    ) -> Result<Decimal, CheckoutError>;
}

/// Snapshot of the order sent along with a voucher validation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherValidationRequest {
    pub code: String,
    pub user_id: Uuid,
    pub items: Vec<OrderLineItem>,
    pub subtotal: Decimal,
}

/// Accept/reject decision from the voucher service. `message` is surfaced
/// to the buyer verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoucherDecision {
    pub accepted: bool,
    pub discount_amount: Decimal,
    pub message: String,
}

/// Voucher service. `Err` means transport failure; a rejected voucher is a
/// successful call with `accepted == false`.
#[async_trait]
pub trait VoucherApi: Send + Sync {
    async fn validate(
        &self,
        request: &VoucherValidationRequest,
    ) -> Result<VoucherDecision, CheckoutError>;
}

/// Order service. Cancellation is the saga's compensating action; the
/// owning order system restores inventory when it runs.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn create(&self, payload: &OrderPayload) -> Result<CreatedOrder, CheckoutError>;
    async fn get_by_number(&self, order_number: &str) -> Result<Order, CheckoutError>;
    async fn cancel(&self, order_number: &str, reason: &str) -> Result<(), CheckoutError>;
}

/// Result of a gateway pre-flight configuration check. A soft problem comes
/// back as `ok == false` with a warning; a hard transport failure is an
/// `Err` from the call itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigCheck {
    pub ok: bool,
    pub warning: Option<String>,
}

/// Payment gateway integration.
#[async_trait]
pub trait PaymentGatewayApi: Send + Sync {
    async fn validate_config(&self) -> Result<GatewayConfigCheck, CheckoutError>;
    async fn create_redirect(&self, order_id: Uuid) -> Result<String, CheckoutError>;
}
