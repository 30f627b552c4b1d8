//! Invoice generation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use crate::config::CompanyProfile;
use crate::domain::value_objects::Money;
use crate::store::{CustomerDirectory, OrderStore};
use crate::Result;

/// GST charged on the subtotal, in percent.
pub const GST_PERCENT: i64 = 18;
/// Flat shipping charge per sale, in minor units.
pub const SHIPPING_COST: Money = Money::new(3000);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvoiceLine {
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Invoice {
    pub sale_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub contact_phone: String,
    pub company: CompanyProfile,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Money,
    pub gst_cost: Money,
    pub shipping_cost: Money,
    pub total_cost: Money,
    pub order_date: DateTime<Utc>,
}

pub struct InvoiceGenerator<S> {
    store: Arc<S>,
    company: CompanyProfile,
}

impl<S: OrderStore + CustomerDirectory> InvoiceGenerator<S> {
    pub fn new(store: Arc<S>, company: CompanyProfile) -> Self { Self { store, company } }

    /// `None` when the sale, its customer or its lines cannot be found. Store
    /// failures are logged and also yield `None`.
    pub async fn generate(&self, sale_id: &str) -> Option<Invoice> {
        match self.build(sale_id).await {
            Ok(invoice) => invoice,
            Err(e) => {
                error!(error = %e, sale_id, "invoice generation failed");
                None
            }
        }
    }

    async fn build(&self, sale_id: &str) -> Result<Option<Invoice>> {
        let Some(sale) = self.store.find_sale_by_id(sale_id).await? else {
            debug!(sale_id, "no sale for invoice");
            return Ok(None);
        };
        let Some(customer) = self.store.customer_by_id(&sale.customer_id).await? else {
            debug!(sale_id, customer_id = %sale.customer_id, "no customer for invoice");
            return Ok(None);
        };
        let lines = self
            .store
            .sale_lines(sale_id)
            .await?
            .into_iter()
            .map(|line| {
                Ok(InvoiceLine {
                    line_total: line.product_price.checked_times(line.quantity)?,
                    product_name: line.product_name,
                    unit_price: line.product_price,
                    quantity: line.quantity,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        if lines.is_empty() {
            debug!(sale_id, "sale has no lines to invoice");
            return Ok(None);
        }

        let subtotal = Money::checked_sum(lines.iter().map(|l| l.line_total))?;
        let gst_cost = subtotal.percent_rounded(GST_PERCENT)?;
        let total_cost = subtotal.checked_add(gst_cost)?.checked_add(SHIPPING_COST)?;
        Ok(Some(Invoice {
            sale_id: sale.sale_id,
            customer_name: customer.name,
            customer_email: customer.email,
            shipping_address: sale.shipping_address,
            contact_phone: sale.contact_phone,
            company: self.company.clone(),
            lines,
            subtotal,
            gst_cost,
            shipping_cost: SHIPPING_COST,
            total_cost,
            order_date: sale.order_date,
        }))
    }
}
