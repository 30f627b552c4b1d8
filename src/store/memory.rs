//! In-memory store.
//!
//! A unit of work takes the whole state lock and writes to a private copy,
//! which replaces the shared state on commit. Units are therefore serialised,
//! and a dropped or rolled-back unit leaves nothing behind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    CustomerDirectory, OrderHistoryEntry, OrderSource, OrderStore, PageReachStore, ProductCatalog, SaleLine,
    SaleListing, StatusCounts, TransactionalStore, UnitOfWork,
};
use crate::domain::aggregates::{CartItem, ConfirmationStatus, Customer, Order, OrderStatus, Product, Sale};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    customers: HashMap<String, Customer>,
    products: HashMap<String, Product>,
    carts: HashMap<String, Vec<CartItem>>,
    addresses: Vec<(String, String)>,
    sales: HashMap<String, Sale>,
    orders: Vec<Order>,
    page_reach: i64,
    #[cfg(test)]
    failing_order_insert: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_customer(&self, customer: Customer) {
        self.state.lock().await.customers.insert(customer.id.clone(), customer);
    }

    pub async fn add_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.product_id.clone(), product);
    }

    pub async fn remove_product(&self, product_id: &str) {
        self.state.lock().await.products.remove(product_id);
    }

    /// Creates the customer's cart if needed.
    pub async fn add_cart_item(&self, customer_id: &str, item: CartItem) {
        self.state.lock().await.carts.entry(customer_id.to_string()).or_default().push(item);
    }

    pub async fn create_cart(&self, customer_id: &str) {
        self.state.lock().await.carts.entry(customer_id.to_string()).or_default();
    }

    pub async fn insert_sale_with_orders(&self, sale: Sale, orders: Vec<Order>) {
        let mut state = self.state.lock().await;
        state.sales.insert(sale.sale_id.clone(), sale);
        state.orders.extend(orders);
    }

    /// Makes the `nth` order insert (1-based) inside every unit of work fail.
    #[cfg(test)]
    pub(crate) async fn fail_order_insert(&self, nth: usize) {
        self.state.lock().await.failing_order_insert = Some(nth);
    }

    pub async fn cart_items(&self, customer_id: &str) -> Option<Vec<CartItem>> {
        self.state.lock().await.carts.get(customer_id).cloned()
    }

    pub async fn orders_for_sale(&self, sale_id: &str) -> Vec<Order> {
        self.state.lock().await.orders.iter().filter(|o| o.sale_id == sale_id).cloned().collect()
    }

    pub async fn sales_for_customer(&self, customer_id: &str) -> Vec<Sale> {
        self.state.lock().await.sales.values().filter(|s| s.customer_id == customer_id).cloned().collect()
    }

    pub async fn addresses_for(&self, customer_id: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state.addresses.iter().filter(|(c, _)| c == customer_id).map(|(_, a)| a.clone()).collect()
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn product_by_id(&self, product_id: &str) -> Result<Option<Product>> {
        Ok(self.state.lock().await.products.get(product_id).cloned())
    }

    async fn products_newest_first(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.state.lock().await.products.values().cloned().collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.product_id.cmp(&b.product_id)));
        Ok(products)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn all_orders(&self, source: OrderSource) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| match source {
                OrderSource::All => true,
                _ => state.sales.get(&o.sale_id).is_some_and(|s| source.admits(s.sale_mode)),
            })
            .cloned()
            .collect())
    }

    async fn find_sale_by_id(&self, sale_id: &str) -> Result<Option<Sale>> {
        Ok(self.state.lock().await.sales.get(sale_id).cloned())
    }

    async fn list_sales(&self) -> Result<Vec<SaleListing>> {
        let state = self.state.lock().await;
        let mut listings: Vec<SaleListing> = state
            .sales
            .values()
            .filter_map(|sale| {
                let customer = state.customers.get(&sale.customer_id)?;
                Some(SaleListing { sale: sale.clone(), customer_name: customer.name.clone() })
            })
            .collect();
        listings.sort_by(|a, b| b.sale.order_date.cmp(&a.sale.order_date));
        Ok(listings)
    }

    async fn sale_lines(&self, sale_id: &str) -> Result<Vec<SaleLine>> {
        let state = self.state.lock().await;
        let mut lines: Vec<SaleLine> = state
            .orders
            .iter()
            .filter(|o| o.sale_id == sale_id)
            .map(|o| SaleLine {
                order_id: o.order_id.clone(),
                product_name: state
                    .products
                    .get(&o.product_id)
                    .map(|p| p.product_name.clone())
                    .unwrap_or_else(|| o.product_id.clone()),
                product_price: o.unit_price,
                quantity: o.quantity,
            })
            .collect();
        lines.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        Ok(lines)
    }

    async fn order_history(&self, customer_id: &str) -> Result<Vec<OrderHistoryEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<OrderHistoryEntry> = state
            .orders
            .iter()
            .filter_map(|o| {
                let sale = state.sales.get(&o.sale_id).filter(|s| s.customer_id == customer_id)?;
                let product = state.products.get(&o.product_id)?;
                Some(OrderHistoryEntry {
                    sale_id: sale.sale_id.clone(),
                    order_id: o.order_id.clone(),
                    product_id: o.product_id.clone(),
                    product_name: product.product_name.clone(),
                    product_price: product.product_price,
                    quantity: o.quantity,
                    product_image: product.first_image().map(str::to_string),
                    order_date: sale.order_date,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.order_date.cmp(&a.order_date).then_with(|| a.order_id.cmp(&b.order_id)));
        Ok(entries)
    }

    async fn sale_status_counts(&self) -> Result<StatusCounts> {
        let state = self.state.lock().await;
        let mut counts = StatusCounts::default();
        for sale in state.sales.values() {
            if sale.order_status == OrderStatus::Delivered {
                counts.completed += 1;
            } else if sale.order_confirmation_status != ConfirmationStatus::Rejected {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }

    async fn repeating_customer_count(&self) -> Result<i64> {
        let state = self.state.lock().await;
        let mut per_customer: HashMap<&str, i64> = HashMap::new();
        for sale in state.sales.values() {
            *per_customer.entry(sale.customer_id.as_str()).or_default() += 1;
        }
        Ok(per_customer.values().filter(|&&n| n >= 2).count() as i64)
    }

    async fn sale_count(&self) -> Result<i64> {
        Ok(self.state.lock().await.sales.len() as i64)
    }
}

#[async_trait]
impl CustomerDirectory for MemoryStore {
    async fn customer_by_id(&self, customer_id: &str) -> Result<Option<Customer>> {
        Ok(self.state.lock().await.customers.get(customer_id).cloned())
    }

    async fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
        Ok(self.state.lock().await.customers.values().find(|c| c.username == username).cloned())
    }
}

#[async_trait]
impl PageReachStore for MemoryStore {
    async fn page_reach(&self) -> Result<i64> {
        Ok(self.state.lock().await.page_reach)
    }

    async fn add_page_reach(&self, delta: i64) -> Result<()> {
        self.state.lock().await.page_reach += delta;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for MemoryStore {
    type Unit = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryUnitOfWork {
            guard,
            working,
            #[cfg(test)]
            order_inserts: 0,
        })
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    #[cfg(test)]
    order_inserts: usize,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_cart(&mut self, customer_id: &str) -> Result<Option<Vec<CartItem>>> {
        Ok(self.working.carts.get(customer_id).cloned())
    }

    async fn remove_cart_item(&mut self, item_id: &str) -> Result<()> {
        for items in self.working.carts.values_mut() {
            items.retain(|i| i.item_id != item_id);
        }
        Ok(())
    }

    async fn product_by_id(&mut self, product_id: &str) -> Result<Option<Product>> {
        Ok(self.working.products.get(product_id).cloned())
    }

    async fn save_address(&mut self, customer_id: &str, address: &str) -> Result<()> {
        self.working.addresses.push((customer_id.to_string(), address.to_string()));
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<()> {
        if self.working.sales.contains_key(&sale.sale_id) {
            return Err(CommerceError::Storage(format!("duplicate sale id {}", sale.sale_id)));
        }
        self.working.sales.insert(sale.sale_id.clone(), sale.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        #[cfg(test)]
        {
            self.order_inserts += 1;
            if self.working.failing_order_insert == Some(self.order_inserts) {
                return Err(CommerceError::Storage("order insert failed".into()));
            }
        }
        self.working.orders.push(order.clone());
        Ok(())
    }

    async fn lock_sale(&mut self, sale_id: &str) -> Result<Option<Sale>> {
        Ok(self.working.sales.get(sale_id).cloned())
    }

    async fn set_confirmation_status(&mut self, sale_id: &str, status: ConfirmationStatus) -> Result<u64> {
        Ok(match self.working.sales.get_mut(sale_id) {
            Some(sale) => {
                sale.order_confirmation_status = status;
                1
            }
            None => 0,
        })
    }

    async fn set_order_status(&mut self, sale_id: &str, status: OrderStatus) -> Result<u64> {
        Ok(match self.working.sales.get_mut(sale_id) {
            Some(sale) => {
                sale.order_status = status;
                1
            }
            None => 0,
        })
    }

    async fn commit(self) -> Result<()> {
        let MemoryUnitOfWork { mut guard, working, .. } = self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}
