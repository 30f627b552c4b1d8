//! Persistence seams used by the sales core.
//!
//! Reads that need no isolation go through the store itself. Checkout and
//! status updates open a [`UnitOfWork`], which is a database transaction in
//! the Postgres store: everything written through it becomes visible on
//! [`UnitOfWork::commit`] or not at all.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::aggregates::{CartItem, ConfirmationStatus, Customer, Order, OrderStatus, Product, Sale, SaleMode};
use crate::domain::value_objects::Money;
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which sale channel an order scan covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OrderSource {
    All,
    Online,
    Offline,
}

impl OrderSource {
    pub fn table(self) -> &'static str {
        match self {
            OrderSource::All => "orders",
            OrderSource::Online => "online_order_summary",
            OrderSource::Offline => "offline_order_summary",
        }
    }

    pub fn admits(self, mode: SaleMode) -> bool {
        match self {
            OrderSource::All => true,
            OrderSource::Online => mode == SaleMode::Online,
            OrderSource::Offline => mode == SaleMode::Offline,
        }
    }
}

/// An order line joined with its product, for invoices.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaleLine {
    pub order_id: String,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderHistoryEntry {
    pub sale_id: String,
    pub order_id: String,
    pub product_id: String,
    pub product_name: String,
    pub product_price: Money,
    pub quantity: i64,
    pub product_image: Option<String>,
    pub order_date: DateTime<Utc>,
}

/// Sale header plus the customer's display name, for the admin dashboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaleListing {
    #[serde(flatten)]
    pub sale: Sale,
    pub customer_name: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub completed: i64,
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product_by_id(&self, product_id: &str) -> Result<Option<Product>>;
    async fn products_newest_first(&self) -> Result<Vec<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn all_orders(&self, source: OrderSource) -> Result<Vec<Order>>;
    async fn find_sale_by_id(&self, sale_id: &str) -> Result<Option<Sale>>;
    async fn list_sales(&self) -> Result<Vec<SaleListing>>;
    /// Lines in a stable order (by order id).
    async fn sale_lines(&self, sale_id: &str) -> Result<Vec<SaleLine>>;
    /// Newest first.
    async fn order_history(&self, customer_id: &str) -> Result<Vec<OrderHistoryEntry>>;
    /// Completed = delivered; pending = neither delivered nor rejected.
    async fn sale_status_counts(&self) -> Result<StatusCounts>;
    /// Customers with at least two sales.
    async fn repeating_customer_count(&self) -> Result<i64>;
    async fn sale_count(&self) -> Result<i64>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn customer_by_id(&self, customer_id: &str) -> Result<Option<Customer>>;
    async fn customer_by_username(&self, username: &str) -> Result<Option<Customer>>;
}

#[async_trait]
pub trait PageReachStore: Send + Sync {
    async fn page_reach(&self) -> Result<i64>;
    /// Merge `delta` into the durable counter by addition.
    async fn add_page_reach(&self, delta: i64) -> Result<()>;
}

/// Writes that must land together.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks the customer's cart for the rest of the unit and returns its
    /// items, or `None` when the customer has no cart.
    async fn lock_cart(&mut self, customer_id: &str) -> Result<Option<Vec<CartItem>>>;
    async fn remove_cart_item(&mut self, item_id: &str) -> Result<()>;
    async fn product_by_id(&mut self, product_id: &str) -> Result<Option<Product>>;
    async fn save_address(&mut self, customer_id: &str, address: &str) -> Result<()>;
    async fn insert_sale(&mut self, sale: &Sale) -> Result<()>;
    async fn insert_order(&mut self, order: &Order) -> Result<()>;
    /// Locks the sale row for the rest of the unit.
    async fn lock_sale(&mut self, sale_id: &str) -> Result<Option<Sale>>;
    async fn set_confirmation_status(&mut self, sale_id: &str, status: ConfirmationStatus) -> Result<u64>;
    async fn set_order_status(&mut self, sale_id: &str, status: OrderStatus) -> Result<u64>;
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Unit: UnitOfWork;
    async fn begin(&self) -> Result<Self::Unit>;
}

/// Everything the sales core needs from persistence.
pub trait CommerceStore:
    OrderStore + ProductCatalog + CustomerDirectory + PageReachStore + TransactionalStore + 'static
{
}

impl<T> CommerceStore for T where
    T: OrderStore + ProductCatalog + CustomerDirectory + PageReachStore + TransactionalStore + 'static
{
}
