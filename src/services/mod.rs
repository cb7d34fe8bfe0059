/// Checkout domain services.
pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod stock;
pub mod sweep;
pub mod validation;
pub mod wallet;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use validation::CartValidator;
pub use wallet::WalletService;
