//! Voucher validation.
//!
//! Wraps the external voucher service: normalizes the code, rejects empty
//! codes locally without a network call, and converts server rejections and
//! transport failures into the error taxonomy. Validation is idempotent and
//! safe to repeat; the coordinator re-runs it server-side at order creation
//! instead of trusting the cached discount.

use std::sync::Arc;

use tracing::instrument;
use uuid::Uuid;

use crate::errors::CheckoutError;
use crate::integrations::{VoucherApi, VoucherValidationRequest};
use crate::models::{AppliedVoucherDiscount, CartSnapshot, OrderLineItem};

/// Generic message shown when the voucher service cannot be reached.
const TRANSPORT_FAILURE_MESSAGE: &str = "Could not validate the voucher, please try again";

#[derive(Clone)]
pub struct VoucherValidator {
    api: Arc<dyn VoucherApi>,
}

impl VoucherValidator {
    pub fn new(api: Arc<dyn VoucherApi>) -> Self {
        Self { api }
    }

    /// Trims and upper-cases a voucher code the way the voucher service
    /// stores them.
    pub fn normalize(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Validates `code` for `user_id` against a snapshot of the cart.
    ///
    /// - empty code: rejected locally, no network call;
    /// - server rejection: `Validation` carrying the server message verbatim;
    /// - transport failure: `ExternalService` with a generic message.
    #[instrument(skip(self, cart), fields(user_id = %user_id))]
    pub async fn validate(
        &self,
        code: &str,
        user_id: Uuid,
        cart: &CartSnapshot,
    ) -> Result<AppliedVoucherDiscount, CheckoutError> {
        let code = Self::normalize(code);
        if code.is_empty() {
            return Err(CheckoutError::Validation(
                "Voucher code must not be empty".to_string(),
            ));
        }

        let request = VoucherValidationRequest {
            code: code.clone(),
            user_id,
            items: cart
                .items
                .iter()
                .map(|i| OrderLineItem {
                    product_id: i.product_id,
                    name: i.name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
            subtotal: cart.subtotal,
        };

        let decision = self
            .api
            .validate(&request)
            .await
            .map_err(|_| CheckoutError::ExternalService(TRANSPORT_FAILURE_MESSAGE.to_string()))?;

        if !decision.accepted {
            return Err(CheckoutError::Validation(decision.message));
        }

        Ok(AppliedVoucherDiscount {
            code,
            discount_amount: decision.discount_amount,
            message: decision.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::memory::InMemoryVouchers;
    use crate::models::{CartItem, DiscountType, Voucher};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn cart() -> CartSnapshot {
        CartSnapshot {
            cart_id: Uuid::new_v4(),
            items: vec![CartItem {
                product_id: Uuid::new_v4(),
                name: "Linen shirt".into(),
                quantity: 1,
                unit_price: dec!(300000),
                weight_grams: 250,
            }],
            subtotal: dec!(300000),
        }
    }

    fn seeded() -> (VoucherValidator, Arc<InMemoryVouchers>) {
        let api = Arc::new(InMemoryVouchers::new());
        api.seed(Voucher {
            code: "SUMMER10".into(),
            discount_type: DiscountType::Percentage,
            value: dec!(10),
            min_order_amount: dec!(100000),
            max_discount_amount: Some(dec!(50000)),
            start_date: Utc::now() - Duration::days(1),
            end_date: Utc::now() + Duration::days(1),
            usage_limit: None,
            usage_count: 0,
        });
        (VoucherValidator::new(api.clone()), api)
    }

    #[test]
    fn codes_are_trimmed_and_upper_cased() {
        assert_eq!(VoucherValidator::normalize("  summer10 "), "SUMMER10");
    }

    #[tokio::test]
    async fn empty_code_rejected_locally() {
        let (validator, api) = seeded();
        // Even an unreachable service never sees an empty code.
        api.set_failing(true);
        let err = validator.validate("   ", Uuid::new_v4(), &cart()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }

    #[tokio::test]
    async fn accepted_voucher_yields_discount() {
        let (validator, _) = seeded();
        let applied = validator
            .validate("summer10", Uuid::new_v4(), &cart())
            .await
            .unwrap();
        assert_eq!(applied.code, "SUMMER10");
        assert_eq!(applied.discount_amount, dec!(30000));
    }

    #[tokio::test]
    async fn server_rejection_surfaces_server_message() {
        let (validator, _) = seeded();
        let err = validator
            .validate("NOPE", Uuid::new_v4(), &cart())
            .await
            .unwrap_err();
        match err {
            CheckoutError::Validation(msg) => assert_eq!(msg, "Voucher does not exist"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_failure_is_generic() {
        let (validator, api) = seeded();
        api.set_failing(true);
        let err = validator
            .validate("SUMMER10", Uuid::new_v4(), &cart())
            .await
            .unwrap_err();
        match err {
            CheckoutError::ExternalService(msg) => {
                assert_eq!(msg, TRANSPORT_FAILURE_MESSAGE)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
