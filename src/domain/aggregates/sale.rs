//! Sale Aggregate
//!
//! A sale is the customer-facing header grouping one or more order lines. It
//! carries two independent state machines: staff confirmation and fulfilment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::CommerceError;

/// Closed text-backed status enums. The text form is what the database and the
/// wire carry.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name { $($variant),+ }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }

        impl FromStr for $name {
            type Err = CommerceError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s { $($text => Ok(Self::$variant),)+ other => Err(CommerceError::InvalidStatus(other.to_string())) }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

text_enum!(ConfirmationStatus { Pending => "PENDING", Accepted => "ACCEPTED", Rejected => "REJECTED" });
text_enum!(OrderStatus { Pending => "PENDING", Dispatched => "DISPATCHED", Delivered => "DELIVERED" });
text_enum!(PaymentStatus { Pending => "PENDING", Paid => "PAID", Refunded => "REFUNDED" });
text_enum!(SaleMode { Online => "ONLINE", Offline => "OFFLINE" });

/// Verdict for a requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Allowed,
    Unchanged,
    Rejected,
}

impl ConfirmationStatus {
    /// PENDING may move to ACCEPTED or REJECTED; both are terminal.
    pub fn transition_to(self, next: ConfirmationStatus) -> Transition {
        use ConfirmationStatus::*;
        match (self, next) {
            (Pending, Pending) | (Accepted, Accepted) | (Rejected, Rejected) => Transition::Unchanged,
            (Pending, Accepted) | (Pending, Rejected) => Transition::Allowed,
            (Accepted, Pending) | (Accepted, Rejected) | (Rejected, Pending) | (Rejected, Accepted) => Transition::Rejected,
        }
    }
}

impl OrderStatus {
    /// Fulfilment only moves forward.
    pub fn transition_to(self, next: OrderStatus) -> Transition {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Pending) | (Dispatched, Dispatched) | (Delivered, Delivered) => Transition::Unchanged,
            (Pending, Dispatched) | (Pending, Delivered) | (Dispatched, Delivered) => Transition::Allowed,
            (Dispatched, Pending) | (Delivered, Pending) | (Delivered, Dispatched) => Transition::Rejected,
        }
    }
}

impl SaleMode {
    /// Offline sales are entered by staff and start out confirmed.
    pub fn default_confirmation(self) -> ConfirmationStatus {
        match self {
            SaleMode::Online => ConfirmationStatus::Pending,
            SaleMode::Offline => ConfirmationStatus::Accepted,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub sale_id: String,
    pub customer_id: String,
    pub shipping_address: String,
    pub contact_phone: String,
    pub transaction_id: Option<String>,
    pub payment_status: PaymentStatus,
    pub sale_mode: SaleMode,
    pub order_confirmation_status: ConfirmationStatus,
    pub order_status: OrderStatus,
    pub order_date: DateTime<Utc>,
}

/// Sale header as submitted by a client. Unset status fields are filled with
/// the channel's defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct SaleDraft {
    #[validate(length(min = 1, message = "shipping address is required"))]
    pub shipping_address: String,
    #[validate(length(min = 1, message = "contact phone is required"))]
    pub contact_phone: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub sale_mode: Option<SaleMode>,
    #[serde(default)]
    pub order_confirmation_status: Option<ConfirmationStatus>,
    #[serde(default)]
    pub order_status: Option<OrderStatus>,
}

impl Sale {
    pub fn open(draft: &SaleDraft, customer_id: impl Into<String>, channel: SaleMode, now: DateTime<Utc>) -> Self {
        Self {
            sale_id: Uuid::now_v7().to_string(),
            customer_id: customer_id.into(),
            shipping_address: draft.shipping_address.clone(),
            contact_phone: draft.contact_phone.clone(),
            transaction_id: draft.transaction_id.clone(),
            payment_status: draft.payment_status.unwrap_or(PaymentStatus::Paid),
            sale_mode: draft.sale_mode.unwrap_or(channel),
            order_confirmation_status: draft.order_confirmation_status.unwrap_or(channel.default_confirmation()),
            order_status: draft.order_status.unwrap_or(OrderStatus::Pending),
            order_date: now,
        }
    }
}
