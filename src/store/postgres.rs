//! Postgres-backed store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    CustomerDirectory, OrderHistoryEntry, OrderSource, OrderStore, PageReachStore, ProductCatalog, SaleLine,
    SaleListing, StatusCounts, TransactionalStore, UnitOfWork,
};
use crate::domain::aggregates::{CartItem, ConfirmationStatus, Customer, Order, OrderStatus, Product, Sale};
use crate::domain::value_objects::Money;
use crate::{CommerceError, Result};

const SALE_COLUMNS: &str = "sale_id, customer_id, shipping_address, contact_phone, transaction_id, payment_status, \
     sale_mode, order_confirmation_status, order_status, order_date";
const PRODUCT_COLUMNS: &str = "product_id, product_name, product_price, product_profit, product_images, created_at";

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    sale_id: String,
    customer_id: String,
    shipping_address: String,
    contact_phone: String,
    transaction_id: Option<String>,
    payment_status: String,
    sale_mode: String,
    order_confirmation_status: String,
    order_status: String,
    order_date: DateTime<Utc>,
}

impl TryFrom<SaleRow> for Sale {
    type Error = CommerceError;
    fn try_from(r: SaleRow) -> Result<Self> {
        Ok(Sale {
            payment_status: r.payment_status.parse()?,
            sale_mode: r.sale_mode.parse()?,
            order_confirmation_status: r.order_confirmation_status.parse()?,
            order_status: r.order_status.parse()?,
            sale_id: r.sale_id,
            customer_id: r.customer_id,
            shipping_address: r.shipping_address,
            contact_phone: r.contact_phone,
            transaction_id: r.transaction_id,
            order_date: r.order_date,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleListingRow {
    #[sqlx(flatten)]
    sale: SaleRow,
    customer_name: String,
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: String,
    sale_id: String,
    product_id: String,
    quantity: i64,
    product_price: i64,
    product_profit: i64,
    order_date: Option<DateTime<Utc>>,
}

impl From<OrderRow> for Order {
    fn from(r: OrderRow) -> Self {
        Order {
            order_id: r.order_id,
            sale_id: r.sale_id,
            product_id: r.product_id,
            quantity: r.quantity,
            unit_price: Money::new(r.product_price),
            unit_profit: Money::new(r.product_profit),
            order_date: r.order_date,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    product_id: String,
    product_name: String,
    product_price: i64,
    product_profit: i64,
    product_images: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            product_id: r.product_id,
            product_name: r.product_name,
            product_price: Money::new(r.product_price),
            product_profit: Money::new(r.product_profit),
            product_images: r.product_images,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow { id: String, username: String, name: String, email: String }

impl From<CustomerRow> for Customer {
    fn from(r: CustomerRow) -> Self { Customer { id: r.id, username: r.username, name: r.name, email: r.email } }
}

#[derive(Debug, sqlx::FromRow)]
struct SaleLineRow { order_id: String, product_name: String, product_price: i64, quantity: i64 }

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    sale_id: String,
    order_id: String,
    product_id: String,
    product_name: String,
    product_price: i64,
    quantity: i64,
    product_image: Option<String>,
    order_date: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct CartItemRow { item_id: String, product_id: String, quantity: i64 }

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn product_by_id(&self, product_id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql).bind(product_id).fetch_optional(&self.pool).await?;
        Ok(row.map(Product::from))
    }

    async fn products_newest_first(&self) -> Result<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, ProductRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn all_orders(&self, source: OrderSource) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT order_id, sale_id, product_id, quantity, product_price, product_profit, order_date FROM {}",
            source.table()
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Order::from).collect())
    }

    async fn find_sale_by_id(&self, sale_id: &str) -> Result<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE sale_id = $1");
        let row = sqlx::query_as::<_, SaleRow>(&sql).bind(sale_id).fetch_optional(&self.pool).await?;
        row.map(Sale::try_from).transpose()
    }

    async fn list_sales(&self) -> Result<Vec<SaleListing>> {
        let rows = sqlx::query_as::<_, SaleListingRow>(
            "SELECT s.sale_id, s.customer_id, s.shipping_address, s.contact_phone, s.transaction_id, s.payment_status, \
             s.sale_mode, s.order_confirmation_status, s.order_status, s.order_date, c.name AS customer_name \
             FROM sales s JOIN customers c ON c.id = s.customer_id ORDER BY s.order_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| Ok(SaleListing { sale: Sale::try_from(r.sale)?, customer_name: r.customer_name }))
            .collect()
    }

    async fn sale_lines(&self, sale_id: &str) -> Result<Vec<SaleLine>> {
        let rows = sqlx::query_as::<_, SaleLineRow>(
            "SELECT o.order_id, COALESCE(p.product_name, o.product_id) AS product_name, o.product_price, o.quantity \
             FROM orders o LEFT JOIN products p ON p.product_id = o.product_id \
             WHERE o.sale_id = $1 ORDER BY o.order_id",
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| SaleLine {
                order_id: r.order_id,
                product_name: r.product_name,
                product_price: Money::new(r.product_price),
                quantity: r.quantity,
            })
            .collect())
    }

    async fn order_history(&self, customer_id: &str) -> Result<Vec<OrderHistoryEntry>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            "SELECT s.sale_id, o.order_id, o.product_id, p.product_name, p.product_price, o.quantity, \
             p.product_images[1] AS product_image, s.order_date \
             FROM sales s JOIN orders o ON s.sale_id = o.sale_id JOIN products p ON o.product_id = p.product_id \
             WHERE s.customer_id = $1 ORDER BY s.order_date DESC, o.order_id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| OrderHistoryEntry {
                sale_id: r.sale_id,
                order_id: r.order_id,
                product_id: r.product_id,
                product_name: r.product_name,
                product_price: Money::new(r.product_price),
                quantity: r.quantity,
                product_image: r.product_image,
                order_date: r.order_date,
            })
            .collect())
    }

    async fn sale_status_counts(&self) -> Result<StatusCounts> {
        let (pending, completed): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE order_status <> 'DELIVERED' AND order_confirmation_status <> 'REJECTED'), \
             COUNT(*) FILTER (WHERE order_status = 'DELIVERED') FROM sales",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StatusCounts { pending, completed })
    }

    async fn repeating_customer_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM (SELECT customer_id FROM sales GROUP BY customer_id HAVING COUNT(*) >= 2) repeaters",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn sale_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sales").fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl CustomerDirectory for PgStore {
    async fn customer_by_id(&self, customer_id: &str) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT id, username, name, email FROM customers WHERE id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }

    async fn customer_by_username(&self, username: &str) -> Result<Option<Customer>> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT id, username, name, email FROM customers WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Customer::from))
    }
}

#[async_trait]
impl PageReachStore for PgStore {
    async fn page_reach(&self) -> Result<i64> {
        let hits: Option<(i64,)> = sqlx::query_as("SELECT hits FROM page_reach WHERE id = 1").fetch_optional(&self.pool).await?;
        Ok(hits.map(|(h,)| h).unwrap_or(0))
    }

    async fn add_page_reach(&self, delta: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO page_reach (id, hits) VALUES (1, $1) \
             ON CONFLICT (id) DO UPDATE SET hits = page_reach.hits + EXCLUDED.hits",
        )
        .bind(delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for PgStore {
    type Unit = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork> {
        Ok(PgUnitOfWork { tx: self.pool.begin().await? })
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_cart(&mut self, customer_id: &str) -> Result<Option<Vec<CartItem>>> {
        let cart: Option<(String,)> = sqlx::query_as("SELECT cart_id FROM cart WHERE customer_id = $1 FOR UPDATE")
            .bind(customer_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        let Some((cart_id,)) = cart else { return Ok(None) };
        let rows = sqlx::query_as::<_, CartItemRow>(
            "SELECT item_id, product_id, quantity FROM cart_items WHERE cart_id = $1 ORDER BY created_at, item_id",
        )
        .bind(&cart_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(Some(
            rows.into_iter()
                .map(|r| CartItem { item_id: r.item_id, product_id: r.product_id, quantity: r.quantity })
                .collect(),
        ))
    }

    async fn remove_cart_item(&mut self, item_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE item_id = $1").bind(item_id).execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn product_by_id(&mut self, product_id: &str) -> Result<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE product_id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql).bind(product_id).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(Product::from))
    }

    async fn save_address(&mut self, customer_id: &str, address: &str) -> Result<()> {
        sqlx::query("INSERT INTO addresses (address_id, customer_id, address) VALUES ($1, $2, $3)")
            .bind(Uuid::now_v7().to_string())
            .bind(customer_id)
            .bind(address)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_sale(&mut self, sale: &Sale) -> Result<()> {
        let sql = format!("INSERT INTO sales ({SALE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)");
        sqlx::query(&sql)
            .bind(&sale.sale_id)
            .bind(&sale.customer_id)
            .bind(&sale.shipping_address)
            .bind(&sale.contact_phone)
            .bind(&sale.transaction_id)
            .bind(sale.payment_status.as_str())
            .bind(sale.sale_mode.as_str())
            .bind(sale.order_confirmation_status.as_str())
            .bind(sale.order_status.as_str())
            .bind(sale.order_date)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (order_id, sale_id, product_id, quantity, product_price, product_profit, order_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&order.order_id)
        .bind(&order.sale_id)
        .bind(&order.product_id)
        .bind(order.quantity)
        .bind(order.unit_price.minor_units())
        .bind(order.unit_profit.minor_units())
        .bind(order.order_date)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_sale(&mut self, sale_id: &str) -> Result<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE sale_id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, SaleRow>(&sql).bind(sale_id).fetch_optional(&mut *self.tx).await?;
        row.map(Sale::try_from).transpose()
    }

    async fn set_confirmation_status(&mut self, sale_id: &str, status: ConfirmationStatus) -> Result<u64> {
        let done = sqlx::query("UPDATE sales SET order_confirmation_status = $1 WHERE sale_id = $2")
            .bind(status.as_str())
            .bind(sale_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn set_order_status(&mut self, sale_id: &str, status: OrderStatus) -> Result<u64> {
        let done = sqlx::query("UPDATE sales SET order_status = $1 WHERE sale_id = $2")
            .bind(status.as_str())
            .bind(sale_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
