//! Aggregates module
pub mod sale;
pub mod order;
pub mod product;
pub mod cart;

pub use sale::{ConfirmationStatus, OrderStatus, PaymentStatus, Sale, SaleDraft, SaleMode, Transition};
pub use order::Order;
pub use product::Product;
pub use cart::{CartItem, Customer};
