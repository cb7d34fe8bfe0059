/// Storefront entities
pub mod address;
pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod product;
pub mod wallet;
pub mod wallet_transaction;

// Re-export entities
pub use address::{Entity as Address, Model as AddressModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use wallet::{Entity as Wallet, Model as WalletModel};
pub use wallet_transaction::{
    Entity as WalletTransaction, Model as WalletTransactionModel, WalletTransactionKind,
};
