//! Checkout
//!
//! Online checkout turns the customer's cart into a sale with one order line
//! per cart item, priced from the catalog. Offline checkout records a sale
//! entered by staff, with line prices taken from the request as sold.
//!
//! Both paths run in a single unit of work. Any failure rolls the unit back,
//! so a failed checkout leaves the cart as it was and no sale or order behind.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use validator::Validate;

use crate::config::join_url;
use crate::domain::aggregates::{Order, Sale, SaleDraft, SaleMode};
use crate::domain::events::SaleEvent;
use crate::domain::value_objects::Money;
use crate::notify::EventPublisher;
use crate::store::{CommerceStore, OrderHistoryEntry, SaleListing, UnitOfWork};
use crate::{CommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub sale: SaleDraft,
    #[serde(default)]
    pub is_new_address: bool,
}

/// One line of a staff-entered sale, priced as sold.
///
/// The snake_case `product_*` names sent by older dashboard builds are
/// accepted as aliases.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductLine {
    #[serde(alias = "product_id")]
    #[validate(length(min = 1, message = "product id is required"))]
    pub product_id: String,
    #[serde(alias = "product_quantity")]
    #[validate(range(min = 1, max = 100000, message = "quantity must be between 1 and 100000"))]
    pub quantity: i64,
    #[serde(alias = "product_price")]
    #[validate(range(min = 0, max = 1000000000, message = "price must be between 0 and 1000000000"))]
    pub price: i64,
    #[serde(alias = "product_profit")]
    #[validate(range(min = 0, max = 1000000000, message = "profit must be between 0 and 1000000000"))]
    pub profit: i64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfflineCheckoutRequest {
    pub sale: SaleDraft,
    #[serde(alias = "customer_id")]
    pub customer_id: String,
    #[serde(default)]
    pub is_new_address: bool,
    pub products: Vec<ProductLine>,
}

impl OfflineCheckoutRequest {
    fn check(&self) -> std::result::Result<(), String> {
        self.sale.validate().map_err(|e| e.to_string())?;
        if self.products.is_empty() {
            return Err("at least one product line is required".into());
        }
        for line in &self.products {
            line.validate().map_err(|e| format!("{}: {e}", line.product_id))?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutOutcome {
    Placed { sale_id: String },
    /// The customer has no cart, or an empty one.
    NoCartFound,
    ValidationFailed { reason: String },
    /// Infrastructure failure; nothing was written.
    Failed,
}

impl CheckoutOutcome {
    fn invalid(reason: impl Into<String>) -> Self { Self::ValidationFailed { reason: reason.into() } }
}

pub struct CheckoutWorkflow<S> {
    store: Arc<S>,
    events: EventPublisher,
    asset_base_url: String,
}

impl<S: CommerceStore> CheckoutWorkflow<S> {
    pub fn new(store: Arc<S>, events: EventPublisher, asset_base_url: impl Into<String>) -> Self {
        Self { store, events, asset_base_url: asset_base_url.into() }
    }

    pub async fn checkout(&self, username: &str, request: &CheckoutRequest) -> CheckoutOutcome {
        if let Err(e) = request.sale.validate() {
            return CheckoutOutcome::invalid(e.to_string());
        }
        let customer = match self.store.customer_by_username(username).await {
            Ok(Some(customer)) => customer,
            Ok(None) => return CheckoutOutcome::invalid(format!("unknown customer {username}")),
            Err(e) => {
                error!(error = %e, username, "customer lookup failed during checkout");
                return CheckoutOutcome::Failed;
            }
        };

        let mut unit = match self.store.begin().await {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, "failed to open checkout transaction");
                return CheckoutOutcome::Failed;
            }
        };

        match place_from_cart(&mut unit, &customer.id, request).await {
            Ok(Some(sale)) => self.finish(unit, sale).await,
            Ok(None) => {
                abandon(unit, &customer.id).await;
                CheckoutOutcome::NoCartFound
            }
            Err(e) => {
                abandon(unit, &customer.id).await;
                failure(e, &customer.id)
            }
        }
    }

    pub async fn offline_checkout(&self, request: &OfflineCheckoutRequest) -> CheckoutOutcome {
        if let Err(reason) = request.check() {
            return CheckoutOutcome::invalid(reason);
        }
        match self.store.customer_by_id(&request.customer_id).await {
            Ok(Some(_)) => {}
            Ok(None) => return CheckoutOutcome::invalid(format!("unknown customer {}", request.customer_id)),
            Err(e) => {
                error!(error = %e, customer_id = %request.customer_id, "customer lookup failed during offline checkout");
                return CheckoutOutcome::Failed;
            }
        }

        let mut unit = match self.store.begin().await {
            Ok(unit) => unit,
            Err(e) => {
                error!(error = %e, "failed to open checkout transaction");
                return CheckoutOutcome::Failed;
            }
        };

        match place_offline(&mut unit, request).await {
            Ok(sale) => self.finish(unit, sale).await,
            Err(e) => {
                abandon(unit, &request.customer_id).await;
                failure(e, &request.customer_id)
            }
        }
    }

    async fn finish(&self, unit: S::Unit, sale: Sale) -> CheckoutOutcome {
        if let Err(e) = unit.commit().await {
            error!(error = %e, sale_id = %sale.sale_id, "checkout commit failed");
            return CheckoutOutcome::Failed;
        }
        info!(sale_id = %sale.sale_id, customer_id = %sale.customer_id, sale_mode = %sale.sale_mode, "sale placed");
        self.events.publish(SaleEvent::Placed {
            sale_id: sale.sale_id.clone(),
            customer_id: sale.customer_id,
            sale_mode: sale.sale_mode,
        });
        CheckoutOutcome::Placed { sale_id: sale.sale_id }
    }

    /// The customer's order lines, newest first. An unknown user has none.
    pub async fn order_history(&self, username: &str) -> Result<Vec<OrderHistoryEntry>> {
        let Some(customer) = self.store.customer_by_username(username).await? else {
            return Ok(Vec::new());
        };
        let mut entries = self.store.order_history(&customer.id).await?;
        for entry in &mut entries {
            if let Some(image) = entry.product_image.take() {
                entry.product_image = Some(join_url(&self.asset_base_url, &image));
            }
        }
        Ok(entries)
    }

    pub async fn list_sales(&self) -> Result<Vec<SaleListing>> { self.store.list_sales().await }
}

/// `Ok(None)` when there is no cart to check out.
async fn place_from_cart<U: UnitOfWork>(unit: &mut U, customer_id: &str, request: &CheckoutRequest) -> Result<Option<Sale>> {
    let items = match unit.lock_cart(customer_id).await? {
        Some(items) if !items.is_empty() => items,
        _ => return Ok(None),
    };

    if request.is_new_address {
        unit.save_address(customer_id, &request.sale.shipping_address).await?;
    }
    let sale = Sale::open(&request.sale, customer_id, SaleMode::Online, Utc::now());
    unit.insert_sale(&sale).await?;

    for item in items {
        let product = unit
            .product_by_id(&item.product_id)
            .await?
            .ok_or_else(|| CommerceError::ProductNotFound(item.product_id.clone()))?;
        let order = Order::line(&sale, item.product_id, item.quantity, product.product_price, product.product_profit);
        unit.insert_order(&order).await?;
        unit.remove_cart_item(&item.item_id).await?;
    }
    Ok(Some(sale))
}

async fn place_offline<U: UnitOfWork>(unit: &mut U, request: &OfflineCheckoutRequest) -> Result<Sale> {
    if request.is_new_address {
        unit.save_address(&request.customer_id, &request.sale.shipping_address).await?;
    }
    let sale = Sale::open(&request.sale, request.customer_id.as_str(), SaleMode::Offline, Utc::now());
    unit.insert_sale(&sale).await?;

    for line in &request.products {
        let order = Order::line(&sale, line.product_id.as_str(), line.quantity, Money::new(line.price), Money::new(line.profit));
        unit.insert_order(&order).await?;
    }
    Ok(sale)
}

async fn abandon<U: UnitOfWork>(unit: U, customer_id: &str) {
    if let Err(e) = unit.rollback().await {
        warn!(error = %e, customer_id, "checkout rollback failed");
    }
}

fn failure(e: CommerceError, customer_id: &str) -> CheckoutOutcome {
    match e {
        CommerceError::ProductNotFound(product_id) => {
            warn!(product_id = %product_id, customer_id, "checkout rejected: product no longer exists");
            CheckoutOutcome::invalid(format!("product {product_id} no longer exists"))
        }
        e => {
            error!(error = %e, customer_id, "checkout rolled back");
            CheckoutOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartItem, ConfirmationStatus, Customer, OrderStatus, PaymentStatus, Product};
    use crate::store::{MemoryStore, OrderSource, OrderStore};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn product(id: &str, price: i64, profit: i64) -> Product {
        Product {
            product_id: id.into(),
            product_name: format!("Product {id}"),
            product_price: Money::new(price),
            product_profit: Money::new(profit),
            product_images: vec![format!("img/{id}.png")],
            created_at: Utc::now(),
        }
    }

    fn item(id: &str, product_id: &str, quantity: i64) -> CartItem {
        CartItem { item_id: id.into(), product_id: product_id.into(), quantity }
    }

    fn request(is_new_address: bool) -> CheckoutRequest {
        CheckoutRequest {
            sale: SaleDraft { shipping_address: "12 Lake Rd".into(), contact_phone: "9800000000".into(), ..Default::default() },
            is_new_address,
        }
    }

    async fn setup() -> (Arc<MemoryStore>, CheckoutWorkflow<MemoryStore>, UnboundedReceiver<SaleEvent>) {
        let store = Arc::new(MemoryStore::new());
        store
            .add_customer(Customer { id: "C1".into(), username: "asha".into(), name: "Asha".into(), email: "a@x".into() })
            .await;
        store.add_product(product("A", 100, 20)).await;
        store.add_product(product("B", 50, 10)).await;
        let (events, rx) = EventPublisher::channel();
        (store.clone(), CheckoutWorkflow::new(store, events, "http://cdn/"), rx)
    }

    async fn fill_cart(store: &MemoryStore) {
        store.add_cart_item("C1", item("I1", "A", 1)).await;
        store.add_cart_item("C1", item("I2", "B", 3)).await;
    }

    #[tokio::test]
    async fn test_checkout_converts_cart() {
        let (store, workflow, mut rx) = setup().await;
        fill_cart(&store).await;

        let CheckoutOutcome::Placed { sale_id } = workflow.checkout("asha", &request(false)).await else {
            panic!("checkout did not place a sale");
        };
        let sale = store.find_sale_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.order_confirmation_status, ConfirmationStatus::Pending);
        assert_eq!(sale.order_status, OrderStatus::Pending);
        assert_eq!(sale.payment_status, PaymentStatus::Paid);
        assert_eq!(sale.sale_mode, SaleMode::Online);

        let mut orders = store.orders_for_sale(&sale_id).await;
        orders.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        assert_eq!(orders.len(), 2);
        assert_eq!((orders[0].quantity, orders[0].unit_price, orders[0].unit_profit), (1, Money::new(100), Money::new(20)));
        assert_eq!((orders[1].quantity, orders[1].unit_price, orders[1].unit_profit), (3, Money::new(50), Money::new(10)));

        assert_eq!(store.cart_items("C1").await, Some(vec![]));
        assert!(store.addresses_for("C1").await.is_empty());
        assert_eq!(rx.try_recv().unwrap().kind(), "placed");
    }

    #[tokio::test]
    async fn test_missing_or_empty_cart() {
        let (store, workflow, mut rx) = setup().await;
        assert_eq!(workflow.checkout("asha", &request(false)).await, CheckoutOutcome::NoCartFound);
        store.create_cart("C1").await;
        assert_eq!(workflow.checkout("asha", &request(true)).await, CheckoutOutcome::NoCartFound);
        assert!(store.sales_for_customer("C1").await.is_empty());
        assert!(store.addresses_for("C1").await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_checkout_finds_no_cart() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        assert!(matches!(workflow.checkout("asha", &request(false)).await, CheckoutOutcome::Placed { .. }));
        assert_eq!(workflow.checkout("asha", &request(false)).await, CheckoutOutcome::NoCartFound);
        assert_eq!(store.sales_for_customer("C1").await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_of_one_cart_place_one_sale() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;

        let (left, right) = (request(false), request(false));
        let (first, second) = tokio::join!(workflow.checkout("asha", &left), workflow.checkout("asha", &right));
        let outcomes = [first, second];
        let placed: Vec<&String> = outcomes
            .iter()
            .filter_map(|o| match o {
                CheckoutOutcome::Placed { sale_id } => Some(sale_id),
                _ => None,
            })
            .collect();
        assert_eq!(placed.len(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == CheckoutOutcome::NoCartFound).count(), 1);

        assert_eq!(store.sales_for_customer("C1").await.len(), 1);
        assert_eq!(store.orders_for_sale(placed[0]).await.len(), 2);
        assert_eq!(store.all_orders(OrderSource::All).await.unwrap().len(), 2);
        assert_eq!(store.cart_items("C1").await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_failed_order_insert_rolls_back_everything() {
        let (store, workflow, mut rx) = setup().await;
        fill_cart(&store).await;
        store.fail_order_insert(2).await;

        assert_eq!(workflow.checkout("asha", &request(true)).await, CheckoutOutcome::Failed);
        assert_eq!(store.cart_items("C1").await.map(|items| items.len()), Some(2));
        assert!(store.sales_for_customer("C1").await.is_empty());
        assert!(store.all_orders(OrderSource::All).await.unwrap().is_empty());
        assert!(store.addresses_for("C1").await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deleted_product_fails_validation() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        store.remove_product("B").await;
        assert!(matches!(workflow.checkout("asha", &request(false)).await, CheckoutOutcome::ValidationFailed { .. }));
        assert_eq!(store.cart_items("C1").await.map(|items| items.len()), Some(2));
    }

    #[tokio::test]
    async fn test_invalid_draft_and_unknown_user() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        let mut bad = request(false);
        bad.sale.contact_phone.clear();
        assert!(matches!(workflow.checkout("asha", &bad).await, CheckoutOutcome::ValidationFailed { .. }));
        assert!(matches!(workflow.checkout("ghost", &request(false)).await, CheckoutOutcome::ValidationFailed { .. }));
        assert_eq!(store.cart_items("C1").await.map(|items| items.len()), Some(2));
    }

    #[tokio::test]
    async fn test_new_address_is_saved() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        assert!(matches!(workflow.checkout("asha", &request(true)).await, CheckoutOutcome::Placed { .. }));
        assert_eq!(store.addresses_for("C1").await, vec!["12 Lake Rd".to_string()]);
    }

    fn offline(products: Vec<ProductLine>) -> OfflineCheckoutRequest {
        OfflineCheckoutRequest { sale: request(false).sale, customer_id: "C1".into(), is_new_address: false, products }
    }

    fn line(product_id: &str, quantity: i64, price: i64) -> ProductLine {
        ProductLine { product_id: product_id.into(), quantity, price, profit: 5 }
    }

    #[tokio::test]
    async fn test_offline_checkout_snapshots_prices() {
        let (store, workflow, _rx) = setup().await;
        let CheckoutOutcome::Placed { sale_id } = workflow.offline_checkout(&offline(vec![line("A", 2, 90)])).await else {
            panic!("offline checkout did not place a sale");
        };
        let sale = store.find_sale_by_id(&sale_id).await.unwrap().unwrap();
        assert_eq!(sale.order_confirmation_status, ConfirmationStatus::Accepted);
        assert_eq!(sale.order_status, OrderStatus::Pending);
        assert_eq!(sale.sale_mode, SaleMode::Offline);

        let orders = store.orders_for_sale(&sale_id).await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].unit_price, Money::new(90));
        assert_eq!(orders[0].unit_profit, Money::new(5));
    }

    #[tokio::test]
    async fn test_offline_checkout_validation() {
        let (store, workflow, _rx) = setup().await;
        assert!(matches!(workflow.offline_checkout(&offline(vec![])).await, CheckoutOutcome::ValidationFailed { .. }));
        assert!(matches!(workflow.offline_checkout(&offline(vec![line("A", 0, 90)])).await, CheckoutOutcome::ValidationFailed { .. }));
        assert!(matches!(workflow.offline_checkout(&offline(vec![line("A", 1, -1)])).await, CheckoutOutcome::ValidationFailed { .. }));
        let mut stranger = offline(vec![line("A", 1, 10)]);
        stranger.customer_id = "C404".into();
        assert!(matches!(workflow.offline_checkout(&stranger).await, CheckoutOutcome::ValidationFailed { .. }));
        assert!(store.sales_for_customer("C1").await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_checkout_caps_line_amounts() {
        let (store, workflow, _rx) = setup().await;
        let huge_quantity = offline(vec![line("A", 1_000_000_000_000, 100_000_000)]);
        assert!(matches!(workflow.offline_checkout(&huge_quantity).await, CheckoutOutcome::ValidationFailed { .. }));
        let huge_price = offline(vec![line("A", 1, 1_000_000_001)]);
        assert!(matches!(workflow.offline_checkout(&huge_price).await, CheckoutOutcome::ValidationFailed { .. }));
        let mut huge_profit = line("A", 1, 10);
        huge_profit.profit = i64::MAX;
        assert!(matches!(workflow.offline_checkout(&offline(vec![huge_profit])).await, CheckoutOutcome::ValidationFailed { .. }));
        assert!(store.sales_for_customer("C1").await.is_empty());

        let at_limit = offline(vec![line("A", 100_000, 1_000_000_000)]);
        assert!(matches!(workflow.offline_checkout(&at_limit).await, CheckoutOutcome::Placed { .. }));
    }

    #[test]
    fn test_offline_request_accepts_dashboard_field_names() {
        let body = serde_json::json!({
            "sale": { "shipping_address": "12 Lake Rd", "contact_phone": "98" },
            "customer_id": "C1",
            "isNewAddress": true,
            "products": [
                { "product_id": "A", "product_quantity": 2, "product_price": 90, "product_profit": 5 },
                { "productId": "B", "quantity": 1, "price": 40, "profit": 4 }
            ]
        });
        let request: OfflineCheckoutRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.customer_id, "C1");
        assert!(request.is_new_address);
        let first = &request.products[0];
        assert_eq!((first.product_id.as_str(), first.quantity, first.price, first.profit), ("A", 2, 90, 5));
        assert_eq!(request.products[1].product_id, "B");
    }

    #[tokio::test]
    async fn test_offline_failure_rolls_back() {
        let (store, workflow, _rx) = setup().await;
        store.fail_order_insert(2).await;
        let outcome = workflow.offline_checkout(&offline(vec![line("A", 1, 10), line("B", 1, 10)])).await;
        assert_eq!(outcome, CheckoutOutcome::Failed);
        assert!(store.sales_for_customer("C1").await.is_empty());
    }

    #[tokio::test]
    async fn test_order_history_prefixes_images() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        workflow.checkout("asha", &request(false)).await;
        let history = workflow.order_history("asha").await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|h| h.product_image.as_deref().is_some_and(|i| i.starts_with("http://cdn/img/"))));
        assert!(workflow.order_history("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_sales_includes_customer_name() {
        let (store, workflow, _rx) = setup().await;
        fill_cart(&store).await;
        workflow.checkout("asha", &request(false)).await;
        let listings = workflow.list_sales().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].customer_name, "Asha");
    }
}
