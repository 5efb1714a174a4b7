//! Price breakdown calculation.
//!
//! This is the single source of truth for order totals: the saga, the
//! order-creation payload and the settled-order view all call [`compute`]
//! with the same inputs and get bit-identical results.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Flat tax rate applied to the subtotal (not itemized).
pub const DEFAULT_TAX_RATE: Decimal = dec!(0.10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub shipping_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
}

/// Computes the order price breakdown.
///
/// `total = subtotal + subtotal * tax_rate + shipping - discount`.
///
/// Absent inputs default to zero. Negative totals are not clamped; an
/// over-discounted order surfaces as a negative total rather than being
/// silently corrected.
pub fn compute(
    subtotal: Option<Decimal>,
    shipping_fee: Option<Decimal>,
    discount_amount: Option<Decimal>,
    tax_rate: Decimal,
) -> PriceBreakdown {
    let subtotal = subtotal.unwrap_or(Decimal::ZERO);
    let shipping_amount = shipping_fee.unwrap_or(Decimal::ZERO);
    let discount_amount = discount_amount.unwrap_or(Decimal::ZERO);
    let tax_amount = subtotal * tax_rate;

    PriceBreakdown {
        subtotal,
        tax_amount,
        shipping_amount,
        discount_amount,
        total_amount: subtotal + tax_amount + shipping_amount - discount_amount,
    }
}

/// [`compute`] with the default flat tax rate.
pub fn compute_default(
    subtotal: Option<Decimal>,
    shipping_fee: Option<Decimal>,
    discount_amount: Option<Decimal>,
) -> PriceBreakdown {
    compute(subtotal, shipping_fee, discount_amount, DEFAULT_TAX_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breakdown_matches_formula() {
        let b = compute_default(Some(dec!(600000)), Some(dec!(0)), Some(dec!(0)));
        assert_eq!(b.subtotal, dec!(600000));
        assert_eq!(b.tax_amount, dec!(60000));
        assert_eq!(b.shipping_amount, dec!(0));
        assert_eq!(b.discount_amount, dec!(0));
        assert_eq!(b.total_amount, dec!(660000));
    }

    #[test]
    fn absent_inputs_default_to_zero() {
        let b = compute_default(None, None, None);
        assert_eq!(b.total_amount, Decimal::ZERO);
    }

    #[test]
    fn negative_totals_are_not_clamped() {
        let b = compute_default(Some(dec!(1000)), None, Some(dec!(5000)));
        assert_eq!(b.total_amount, dec!(-3900));
    }

    #[test]
    fn recomputation_is_bit_identical() {
        let first = compute_default(Some(dec!(123456.78)), Some(dec!(30000)), Some(dec!(9999)));
        let second = compute_default(Some(dec!(123456.78)), Some(dec!(30000)), Some(dec!(9999)));
        assert_eq!(first, second);
    }
}
