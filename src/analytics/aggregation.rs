//! Calendar-month bucketing of order history.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::aggregates::Order;
use crate::domain::value_objects::DateRange;
use crate::store::{OrderSource, OrderStore};
use crate::Result;

/// Units of one product sold within one bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub total_quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub range: DateRange,
    pub products: Vec<ProductSummary>,
}

impl MonthBucket {
    pub fn total_quantity(&self) -> i64 { self.products.iter().map(|p| p.total_quantity).sum() }
}

/// Buckets for months that had at least one dated order. Months without
/// orders are absent, so consecutive buckets need not be consecutive months.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MonthlySummaries {
    pub buckets: Vec<MonthBucket>,
    /// Orders left out because they carry no usable date.
    pub skipped: usize,
}

/// Groups orders by the calendar month of their date and sums quantities per
/// product within each month.
pub fn bucket_by_month(orders: &[Order]) -> MonthlySummaries {
    let mut months: BTreeMap<DateRange, BTreeMap<&str, i64>> = BTreeMap::new();
    let mut skipped = 0;

    for order in orders {
        let Some(date) = order.order_date else {
            skipped += 1;
            continue;
        };
        *months
            .entry(DateRange::month_of(date.date_naive()))
            .or_default()
            .entry(order.product_id.as_str())
            .or_default() += order.quantity;
    }

    let buckets = months
        .into_iter()
        .map(|(range, per_product)| MonthBucket {
            range,
            products: per_product
                .into_iter()
                .map(|(product_id, total_quantity)| ProductSummary { product_id: product_id.to_string(), total_quantity })
                .collect(),
        })
        .collect();

    MonthlySummaries { buckets, skipped }
}

pub struct AggregationEngine<S> {
    store: Arc<S>,
}

impl<S: OrderStore> AggregationEngine<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    pub async fn monthly_product_summaries(&self, source: OrderSource) -> Result<MonthlySummaries> {
        let orders = self.store.all_orders(source).await?;
        let summaries = bucket_by_month(&orders);
        if summaries.skipped > 0 {
            warn!(skipped = summaries.skipped, table = source.table(), "orders without a usable date left out of monthly buckets");
        }
        debug!(orders = orders.len(), buckets = summaries.buckets.len(), table = source.table(), "bucketed order history");
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::Money;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn order(product: &str, qty: i64, date: Option<(i32, u32, u32)>) -> Order {
        Order {
            order_id: format!("{product}-{qty}-{date:?}"),
            sale_id: "S1".into(),
            product_id: product.into(),
            quantity: qty,
            unit_price: Money::new(100),
            unit_profit: Money::new(20),
            order_date: date.map(|(y, m, d)| Utc.with_ymd_and_hms(y, m, d, 10, 30, 0).unwrap()),
        }
    }

    #[test]
    fn test_same_month_same_product_is_summed() {
        let orders = vec![order("A", 2, Some((2024, 1, 15))), order("A", 3, Some((2024, 1, 28)))];
        let summaries = bucket_by_month(&orders);
        assert_eq!(summaries.buckets.len(), 1);
        let bucket = &summaries.buckets[0];
        assert_eq!(bucket.range, DateRange::for_month(2024, 1).unwrap());
        assert_eq!(bucket.range.start(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(bucket.range.end(), NaiveDate::from_ymd_opt(2024, 1, 31).unwrap());
        assert_eq!(bucket.products, vec![ProductSummary { product_id: "A".into(), total_quantity: 5 }]);
    }

    #[test]
    fn test_bucket_totals_match_order_quantities() {
        let orders = vec![
            order("A", 1, Some((2024, 1, 1))),
            order("B", 4, Some((2024, 1, 31))),
            order("A", 2, Some((2024, 2, 1))),
            order("C", 7, Some((2024, 2, 29))),
            order("B", 5, Some((2023, 12, 31))),
        ];
        let summaries = bucket_by_month(&orders);
        for bucket in &summaries.buckets {
            let expected: i64 = orders
                .iter()
                .filter(|o| bucket.range.contains(o.order_date.unwrap().date_naive()))
                .map(|o| o.quantity)
                .sum();
            assert_eq!(bucket.total_quantity(), expected, "bucket {}", bucket.range);
        }
        let all: i64 = summaries.buckets.iter().map(MonthBucket::total_quantity).sum();
        assert_eq!(all, 19);
    }

    #[test]
    fn test_empty_months_produce_no_bucket() {
        let orders = vec![order("A", 1, Some((2024, 1, 10))), order("A", 1, Some((2024, 4, 10)))];
        let ranges: Vec<DateRange> = bucket_by_month(&orders).buckets.into_iter().map(|b| b.range).collect();
        assert_eq!(ranges, vec![DateRange::for_month(2024, 1).unwrap(), DateRange::for_month(2024, 4).unwrap()]);
    }

    #[test]
    fn test_undated_orders_are_skipped() {
        let orders = vec![order("A", 2, Some((2024, 1, 15))), order("A", 9, None)];
        let summaries = bucket_by_month(&orders);
        assert_eq!(summaries.skipped, 1);
        assert_eq!(summaries.buckets[0].total_quantity(), 2);
    }

    #[test]
    fn test_no_orders() {
        assert_eq!(bucket_by_month(&[]), MonthlySummaries::default());
    }
}
