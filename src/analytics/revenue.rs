//! Revenue/profit series and top-seller ranking over monthly buckets.
//!
//! Both join bucket quantities with the current catalog. A product that no
//! longer exists contributes nothing; the number of such entries is logged.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use super::aggregation::MonthlySummaries;
use crate::domain::aggregates::Product;
use crate::domain::value_objects::Money;
use crate::store::ProductCatalog;
use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RevenueProfitPoint {
    pub date: NaiveDate,
    pub revenue: Money,
    pub profit: Money,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopSeller {
    pub product_id: String,
    pub product_name: String,
    /// First catalog image path, empty when the product has none.
    pub product_image: String,
    pub quantity: i64,
}

pub struct RevenueCalculator<S> {
    catalog: Arc<S>,
}

impl<S: ProductCatalog> RevenueCalculator<S> {
    pub fn new(catalog: Arc<S>) -> Self { Self { catalog } }

    /// One point per bucket, in bucket order. The bucket containing `today` is
    /// labelled `today`; every other bucket is labelled with its last day.
    pub async fn revenue_profit_series(&self, summaries: &MonthlySummaries, today: NaiveDate) -> Result<Vec<RevenueProfitPoint>> {
        let products = self.load_products(summaries).await?;
        let mut missing = 0usize;

        let mut points = Vec::with_capacity(summaries.buckets.len());
        for bucket in &summaries.buckets {
            let mut revenue = Money::ZERO;
            let mut profit = Money::ZERO;
            for summary in &bucket.products {
                match products.get(&summary.product_id) {
                    Some(product) => {
                        revenue = revenue.checked_add(product.product_price.checked_times(summary.total_quantity)?)?;
                        profit = profit.checked_add(product.product_profit.checked_times(summary.total_quantity)?)?;
                    }
                    None => missing += 1,
                }
            }
            let date = if bucket.range.contains(today) { today } else { bucket.range.end() };
            points.push(RevenueProfitPoint { date, revenue, profit });
        }

        if missing > 0 {
            warn!(missing, "bucket entries for products no longer in the catalog left out of revenue");
        }
        Ok(points)
    }

    /// Every product ever sold, by total units across all buckets, highest
    /// first. Equal quantities are ordered by product id.
    pub async fn top_sellers(&self, summaries: &MonthlySummaries) -> Result<Vec<TopSeller>> {
        let mut totals: HashMap<&str, i64> = HashMap::new();
        for summary in summaries.buckets.iter().flat_map(|b| &b.products) {
            *totals.entry(summary.product_id.as_str()).or_default() += summary.total_quantity;
        }

        let products = self.load_products(summaries).await?;
        let mut missing = 0usize;
        let mut sellers: Vec<TopSeller> = totals
            .into_iter()
            .filter_map(|(product_id, quantity)| {
                let Some(product) = products.get(product_id) else {
                    missing += 1;
                    return None;
                };
                Some(TopSeller {
                    product_id: product_id.to_string(),
                    product_name: product.product_name.clone(),
                    product_image: product.first_image().unwrap_or_default().to_string(),
                    quantity,
                })
            })
            .collect();
        sellers.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.product_id.cmp(&b.product_id)));

        if missing > 0 {
            warn!(missing, "products no longer in the catalog left out of top sellers");
        }
        Ok(sellers)
    }

    async fn load_products(&self, summaries: &MonthlySummaries) -> Result<HashMap<String, Product>> {
        let ids: BTreeSet<&str> =
            summaries.buckets.iter().flat_map(|b| &b.products).map(|p| p.product_id.as_str()).collect();
        let mut products = HashMap::with_capacity(ids.len());
        for id in ids {
            if let Some(product) = self.catalog.product_by_id(id).await? {
                products.insert(id.to_string(), product);
            }
        }
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::aggregation::{MonthBucket, ProductSummary};
    use crate::domain::value_objects::DateRange;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn product(id: &str, price: i64, profit: i64) -> Product {
        Product {
            product_id: id.into(),
            product_name: format!("Product {id}"),
            product_price: Money::new(price),
            product_profit: Money::new(profit),
            product_images: vec![format!("{id}.png")],
            created_at: Utc::now(),
        }
    }

    fn bucket(year: i32, month: u32, lines: &[(&str, i64)]) -> MonthBucket {
        MonthBucket {
            range: DateRange::for_month(year, month).unwrap(),
            products: lines
                .iter()
                .map(|(id, qty)| ProductSummary { product_id: id.to_string(), total_quantity: *qty })
                .collect(),
        }
    }

    async fn calculator() -> RevenueCalculator<MemoryStore> {
        let store = MemoryStore::new();
        store.add_product(product("A", 100, 20)).await;
        store.add_product(product("B", 50, 10)).await;
        RevenueCalculator::new(Arc::new(store))
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

    #[tokio::test]
    async fn test_revenue_and_profit_per_bucket() {
        let calc = calculator().await;
        let summaries = MonthlySummaries {
            buckets: vec![bucket(2024, 1, &[("A", 1), ("B", 3)]), bucket(2024, 2, &[("B", 2)])],
            skipped: 0,
        };
        let points = calc.revenue_profit_series(&summaries, ymd(2024, 6, 10)).await.unwrap();
        assert_eq!(
            points,
            vec![
                RevenueProfitPoint { date: ymd(2024, 1, 31), revenue: Money::new(250), profit: Money::new(50) },
                RevenueProfitPoint { date: ymd(2024, 2, 29), revenue: Money::new(100), profit: Money::new(20) },
            ]
        );
    }

    #[tokio::test]
    async fn test_current_month_is_labelled_today() {
        let calc = calculator().await;
        let summaries = MonthlySummaries { buckets: vec![bucket(2024, 6, &[("A", 1)])], skipped: 0 };
        let points = calc.revenue_profit_series(&summaries, ymd(2024, 6, 10)).await.unwrap();
        assert_eq!(points[0].date, ymd(2024, 6, 10));
    }

    #[tokio::test]
    async fn test_missing_products_are_skipped() {
        let calc = calculator().await;
        let summaries = MonthlySummaries { buckets: vec![bucket(2024, 1, &[("A", 2), ("GONE", 40)])], skipped: 0 };
        let points = calc.revenue_profit_series(&summaries, ymd(2024, 6, 10)).await.unwrap();
        assert_eq!(points[0].revenue, Money::new(200));
        let sellers = calc.top_sellers(&summaries).await.unwrap();
        assert_eq!(sellers.len(), 1);
        assert_eq!(sellers[0].product_id, "A");
    }

    #[tokio::test]
    async fn test_top_sellers_are_ranked_across_months() {
        let calc = calculator().await;
        let summaries = MonthlySummaries {
            buckets: vec![bucket(2024, 1, &[("A", 1), ("B", 3)]), bucket(2024, 3, &[("A", 4)])],
            skipped: 0,
        };
        let sellers = calc.top_sellers(&summaries).await.unwrap();
        assert_eq!(sellers.iter().map(|s| (s.product_id.as_str(), s.quantity)).collect::<Vec<_>>(), vec![("A", 5), ("B", 3)]);
        assert_eq!(sellers[0].product_image, "A.png");
        assert!(sellers.windows(2).all(|w| w[0].quantity >= w[1].quantity));
    }

    #[tokio::test]
    async fn test_top_seller_ties_are_stable() {
        let calc = calculator().await;
        let summaries = MonthlySummaries { buckets: vec![bucket(2024, 1, &[("B", 2), ("A", 2)])], skipped: 0 };
        let first = calc.top_sellers(&summaries).await.unwrap();
        let second = calc.top_sellers(&summaries).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].product_id, "A");
    }
}
