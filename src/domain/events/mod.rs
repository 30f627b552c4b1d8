//! Domain events
use serde::Serialize;

use crate::domain::aggregates::{ConfirmationStatus, OrderStatus, SaleMode};

/// Emitted after the transaction that caused it has committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SaleEvent {
    Placed { sale_id: String, customer_id: String, sale_mode: SaleMode },
    ConfirmationChanged { sale_id: String, customer_id: String, from: ConfirmationStatus, to: ConfirmationStatus },
    OrderStatusChanged { sale_id: String, customer_id: String, from: OrderStatus, to: OrderStatus },
}

impl SaleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::ConfirmationChanged { .. } => "confirmation_changed",
            Self::OrderStatusChanged { .. } => "order_status_changed",
        }
    }

    pub fn sale_id(&self) -> &str {
        match self {
            Self::Placed { sale_id, .. }
            | Self::ConfirmationChanged { sale_id, .. }
            | Self::OrderStatusChanged { sale_id, .. } => sale_id,
        }
    }
}
