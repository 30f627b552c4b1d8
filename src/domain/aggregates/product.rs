//! Product catalog entry, as the sales core reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    pub product_price: Money,
    pub product_profit: Money,
    pub product_images: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn first_image(&self) -> Option<&str> { self.product_images.first().map(String::as_str) }
}
