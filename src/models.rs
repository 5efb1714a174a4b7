use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment method selected during checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CreditGateway,
    Cod,
}

/// The external gateways supported for `CreditGateway` payments.
///
/// Only one gateway is wired up today; the enum exists so adding a second
/// one is an additive change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Gateway {
    Vnpay,
}

/// One option returned by the address directory (a region, sub-region or
/// locality), identified by the directory's own code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressOption {
    pub code: String,
    pub name: String,
}

/// Geographic codes for a shipping endpoint, used both for the warehouse
/// origin and the buyer destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoCodes {
    pub region: String,
    pub sub_region: String,
    pub locality: String,
}

/// Cascading address selection state.
///
/// Selecting a region clears the sub-region and locality (and their option
/// lists); selecting a sub-region clears the locality. The option lists are
/// cached alongside the selection so a failed directory call degrades to an
/// empty list instead of an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddressSelection {
    pub region: Option<AddressOption>,
    pub sub_region: Option<AddressOption>,
    pub locality: Option<AddressOption>,
    pub region_options: Vec<AddressOption>,
    pub sub_region_options: Vec<AddressOption>,
    pub locality_options: Vec<AddressOption>,
}

impl AddressSelection {
    /// All three destination levels resolved.
    pub fn is_complete(&self) -> bool {
        self.region.is_some() && self.sub_region.is_some() && self.locality.is_some()
    }

    pub fn destination(&self) -> Option<GeoCodes> {
        Some(GeoCodes {
            region: self.region.as_ref()?.code.clone(),
            sub_region: self.sub_region.as_ref()?.code.clone(),
            locality: self.locality.as_ref()?.code.clone(),
        })
    }
}

/// Buyer contact fields collected on the address step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    /// Free-text street address, prepended to the resolved region names when
    /// the shipping address is flattened for the order payload.
    pub address_line: String,
}

impl ContactInfo {
    pub fn is_complete(&self) -> bool {
        !self.full_name.trim().is_empty()
            && !self.phone.trim().is_empty()
            && !self.email.trim().is_empty()
            && !self.address_line.trim().is_empty()
    }
}

/// A line in the cart, as read from the cart service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub weight_grams: u32,
}

/// Read-only snapshot of the buyer's cart at checkout entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub items: Vec<CartItem>,
    pub subtotal: Decimal,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total shipment weight across all lines.
    pub fn total_weight_grams(&self) -> u32 {
        self.items
            .iter()
            .map(|i| i.weight_grams.saturating_mul(i.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// A voucher as the voucher service knows it.
///
/// The checkout session never holds one of these directly; it only keeps the
/// derived [`AppliedVoucherDiscount`] projection, which is re-validated
/// server-side at order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: Decimal,
    pub min_order_amount: Decimal,
    /// Cap for percentage vouchers; ignored for fixed-amount ones.
    pub max_discount_amount: Option<Decimal>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
}

impl Voucher {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .map(|limit| self.usage_count >= limit)
            .unwrap_or(false)
    }

    /// Discount this voucher yields on `subtotal`. Percentage vouchers are
    /// capped at `max_discount_amount`; no voucher ever discounts more than
    /// the subtotal itself.
    pub fn discount_for(&self, subtotal: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => {
                let discount = subtotal * self.value / dec!(100);
                match self.max_discount_amount {
                    Some(cap) => discount.min(cap),
                    None => discount,
                }
            }
            DiscountType::Fixed => self.value,
        };
        raw.min(subtotal).max(Decimal::ZERO)
    }
}

/// Derived projection of a successfully applied voucher. Re-computable and
/// not authoritative: the coordinator re-validates it at order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedVoucherDiscount {
    pub code: String,
    pub discount_amount: Decimal,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingPayment,
    Paid,
    Cancelled,
}

/// Order line frozen at creation time, independent of later catalog changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Payload sent to the order service on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    pub user_id: Uuid,
    pub items: Vec<OrderLineItem>,
    /// Flattened shipping address: address line + locality + sub-region +
    /// region joined by commas, empty segments dropped.
    pub shipping_address: String,
    pub payment_method: String,
    pub shipping_fee: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub voucher_code: Option<String>,
    pub discount: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
}

/// Identifiers returned by the order service on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub id: Uuid,
    pub order_number: String,
}

/// An order as read back from the order service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderLineItem>,
    pub shipping_address: String,
    pub payment_method: String,
    pub shipping_fee: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Durable breadcrumb written right after order creation and before any
/// external redirect, so a reload can detect a half-finished submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryMarker {
    pub order_id: Uuid,
    pub order_number: String,
    pub payment_method: String,
    pub created_at: DateTime<Utc>,
}

impl RecoveryMarker {
    /// Markers older than the staleness window are treated as abandoned and
    /// ignored by readers. They are only deleted on a terminal outcome.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.created_at > max_age
    }
}

/// Canonical handoff shape between the coordinator/reconciler and whatever
/// renders the final state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub order_number: Option<String>,
    pub success: bool,
    pub message: String,
    pub payment_method: Option<String>,
}

impl CheckoutOutcome {
    pub fn success(order_number: String, payment_method: String, message: impl Into<String>) -> Self {
        Self {
            order_number: Some(order_number),
            success: true,
            message: message.into(),
            payment_method: Some(payment_method),
        }
    }

    pub fn failure(order_number: Option<String>, message: impl Into<String>) -> Self {
        Self {
            order_number,
            success: false,
            message: message.into(),
            payment_method: None,
        }
    }
}

/// A shipping address remembered for reuse, capped to the most recent few
/// per user in the recovery store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAddress {
    pub contact: ContactInfo,
    pub destination: GeoCodes,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voucher(discount_type: DiscountType, value: Decimal, cap: Option<Decimal>) -> Voucher {
        Voucher {
            code: "TEST".into(),
            discount_type,
            value,
            min_order_amount: Decimal::ZERO,
            max_discount_amount: cap,
            start_date: Utc::now() - Duration::days(1),
            end_date: Utc::now() + Duration::days(1),
            usage_limit: None,
            usage_count: 0,
        }
    }

    #[test]
    fn percentage_discount_is_capped() {
        let v = voucher(DiscountType::Percentage, dec!(10), Some(dec!(30000)));
        assert_eq!(v.discount_for(dec!(200000)), dec!(20000));
        assert_eq!(v.discount_for(dec!(600000)), dec!(30000));
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal() {
        let v = voucher(DiscountType::Fixed, dec!(50000), None);
        assert_eq!(v.discount_for(dec!(30000)), dec!(30000));
        assert_eq!(v.discount_for(dec!(80000)), dec!(50000));
    }

    #[test]
    fn marker_staleness() {
        let marker = RecoveryMarker {
            order_id: Uuid::new_v4(),
            order_number: "ORD-1".into(),
            payment_method: "COD".into(),
            created_at: Utc::now() - Duration::minutes(6),
        };
        assert!(marker.is_stale(Utc::now(), Duration::minutes(5)));
        assert!(!marker.is_stale(Utc::now(), Duration::minutes(10)));
    }

    #[test]
    fn cart_weight_sums_line_quantities() {
        let cart = CartSnapshot {
            cart_id: Uuid::new_v4(),
            items: vec![
                CartItem {
                    product_id: Uuid::new_v4(),
                    name: "A".into(),
                    quantity: 2,
                    unit_price: dec!(1000),
                    weight_grams: 200,
                },
                CartItem {
                    product_id: Uuid::new_v4(),
                    name: "B".into(),
                    quantity: 1,
                    unit_price: dec!(500),
                    weight_grams: 150,
                },
            ],
            subtotal: dec!(2500),
        };
        assert_eq!(cart.total_weight_grams(), 550);
    }
}
