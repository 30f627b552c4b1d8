//! Storefront sales backend
//!
//! Checkout, order lifecycle, invoicing and sales analytics for a single
//! storefront's web/mobile clients and its admin dashboard.
//!
//! ## Features
//! - Online (cart-based) and offline (staff-entered) checkout
//! - Confirmation and fulfilment status tracking with customer notifications
//! - Invoice generation
//! - Monthly revenue/profit series, top sellers, conversion and retention metrics

pub mod analytics;
pub mod api;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod invoice;
pub mod lifecycle;
pub mod notify;
pub mod store;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum CommerceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Invalid status value: {0}")]
    InvalidStatus(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

pub type Result<T> = std::result::Result<T, CommerceError>;
