//! Cart and customer records owned by collaborating services.

use serde::{Deserialize, Serialize};

/// A line in a customer's cart, consumed by checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: String,
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
}
