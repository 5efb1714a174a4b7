//! Shipping-fee quotation.
//!
//! Shipping must never block checkout: any failure along the
//! warehouse-origin lookup or the rate call, and a quoted fee of exactly
//! zero, all resolve to the configured fallback fee. Orders above the
//! free-shipping threshold short-circuit to a zero fee without consulting
//! the rate service.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::models::{CartSnapshot, GeoCodes};
use crate::integrations::{ShippingRateApi, WarehouseApi};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingQuote {
    pub fee: Decimal,
    /// True when the fee is the fallback constant rather than a real rate.
    pub fallback: bool,
}

#[derive(Clone)]
pub struct ShippingFeeQuoter {
    warehouse: Arc<dyn WarehouseApi>,
    rates: Arc<dyn ShippingRateApi>,
    fallback_fee: Decimal,
    free_shipping_threshold: Decimal,
}

impl ShippingFeeQuoter {
    pub fn new(
        warehouse: Arc<dyn WarehouseApi>,
        rates: Arc<dyn ShippingRateApi>,
        fallback_fee: Decimal,
        free_shipping_threshold: Decimal,
    ) -> Self {
        Self {
            warehouse,
            rates,
            fallback_fee,
            free_shipping_threshold,
        }
    }

    /// Quotes shipping for a cart to a fully resolved destination.
    ///
    /// The origin is the warehouse shipping the first cart line; the weight
    /// is the whole cart's. Never fails: every error path degrades to the
    /// fallback fee.
    #[instrument(skip(self, cart), fields(cart_id = %cart.cart_id))]
    pub async fn quote_for_cart(&self, cart: &CartSnapshot, destination: &GeoCodes) -> ShippingQuote {
        if cart.subtotal >= self.free_shipping_threshold {
            return ShippingQuote {
                fee: Decimal::ZERO,
                fallback: false,
            };
        }

        let Some(first_line) = cart.items.first() else {
            return self.fallback("cart has no lines to resolve an origin from");
        };

        let origin = match self.warehouse.shipping_origin(first_line.product_id).await {
            Ok(origin) => origin,
            Err(e) => return self.fallback(&format!("origin lookup failed: {}", e)),
        };

        match self
            .rates
            .quote(&origin, destination, cart.total_weight_grams())
            .await
        {
            // A zero rate is treated the same as a failed quote.
            Ok(fee) if fee <= Decimal::ZERO => {
                self.fallback("rate service returned a zero fee")
            }
            Ok(fee) => ShippingQuote {
                fee,
                fallback: false,
            },
            Err(e) => self.fallback(&format!("rate quote failed: {}", e)),
        }
    }

    pub fn fallback_fee(&self) -> Decimal {
        self.fallback_fee
    }

    fn fallback(&self, reason: &str) -> ShippingQuote {
        warn!(reason, fee = %self.fallback_fee, "using fallback shipping fee");
        ShippingQuote {
            fee: self.fallback_fee,
            fallback: true,
        }
    }
}
