pub mod address;
pub mod checkout;
pub mod reconciler;
pub mod shipping;
pub mod vouchers;

pub use address::AddressResolver;
pub use checkout::CheckoutSagaCoordinator;
pub use reconciler::PaymentReturnReconciler;
pub use shipping::ShippingFeeQuoter;
pub use vouchers::VoucherValidator;
