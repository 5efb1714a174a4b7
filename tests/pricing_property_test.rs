//! Property-based tests for the price breakdown and voucher arithmetic.

use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use storefront_checkout::models::{DiscountType, Voucher};
use storefront_checkout::pricing;

fn amount_strategy() -> impl Strategy<Value = Decimal> {
    // Whole currency units, the granularity the storefront prices in.
    (0u64..100_000_000u64).prop_map(Decimal::from)
}

fn voucher(discount_type: DiscountType, value: Decimal, cap: Option<Decimal>) -> Voucher {
    use chrono::{Duration, Utc};
    Voucher {
        code: "PROP".to_string(),
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

proptest! {
    #[test]
    fn total_is_the_sum_of_its_parts(
        subtotal in amount_strategy(),
        shipping in amount_strategy(),
        discount in amount_strategy(),
    ) {
        let b = pricing::compute(Some(subtotal), Some(shipping), Some(discount), dec!(0.10));
        prop_assert_eq!(b.subtotal, subtotal);
        prop_assert_eq!(b.tax_amount, subtotal * dec!(0.10));
        prop_assert_eq!(
            b.total_amount,
            b.subtotal + b.tax_amount + b.shipping_amount - b.discount_amount
        );
    }

    #[test]
    fn recomputation_is_bit_identical(
        subtotal in amount_strategy(),
        shipping in amount_strategy(),
        discount in amount_strategy(),
    ) {
        let first = pricing::compute(Some(subtotal), Some(shipping), Some(discount), dec!(0.10));
        let second = pricing::compute(Some(subtotal), Some(shipping), Some(discount), dec!(0.10));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn absent_inputs_behave_like_zero(subtotal in amount_strategy()) {
        let explicit = pricing::compute(
            Some(subtotal),
            Some(Decimal::ZERO),
            Some(Decimal::ZERO),
            dec!(0.10),
        );
        let defaulted = pricing::compute(Some(subtotal), None, None, dec!(0.10));
        prop_assert_eq!(explicit, defaulted);
    }

    #[test]
    fn percentage_discount_never_exceeds_cap_or_subtotal(
        subtotal in amount_strategy(),
        percent in 1u8..=100u8,
        cap in amount_strategy(),
    ) {
        let v = voucher(
            DiscountType::Percentage,
            Decimal::from(percent),
            Some(cap),
        );
        let discount = v.discount_for(subtotal);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= cap);
        prop_assert!(discount <= subtotal);
    }

    #[test]
    fn fixed_discount_never_exceeds_subtotal(
        subtotal in amount_strategy(),
        value in amount_strategy(),
    ) {
        let v = voucher(DiscountType::Fixed, value, None);
        let discount = v.discount_for(subtotal);
        prop_assert!(discount >= Decimal::ZERO);
        prop_assert!(discount <= subtotal);
    }
}
