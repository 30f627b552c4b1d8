//! Order line Aggregate
//!
//! One product line within a sale. Price and profit are snapshotted when the
//! line is written and never updated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::Sale;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    pub unit_profit: Money,
    /// `None` when the stored date is missing or unreadable.
    pub order_date: Option<DateTime<Utc>>,
}

impl Order {
    pub fn line(sale: &Sale, product_id: impl Into<String>, quantity: i64, unit_price: Money, unit_profit: Money) -> Self {
        Self {
            order_id: Uuid::now_v7().to_string(),
            sale_id: sale.sale_id.clone(),
            product_id: product_id.into(),
            quantity,
            unit_price,
            unit_profit,
            order_date: Some(sale.order_date),
        }
    }
}
