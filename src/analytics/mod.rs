//! Sales analytics
//!
//! Monthly revenue/profit series, top sellers, new arrivals and the dashboard
//! counters (pending/completed sales, page reach, repeating customers and
//! conversion rate).

pub mod aggregation;
pub mod page_reach;
pub mod revenue;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

pub use aggregation::{bucket_by_month, AggregationEngine, MonthBucket, MonthlySummaries, ProductSummary};
pub use page_reach::PageReachCounter;
pub use revenue::{RevenueCalculator, RevenueProfitPoint, TopSeller};

use crate::config::join_url;
use crate::store::{CommerceStore, OrderSource, StatusCounts};
use crate::Result;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OnlineOfflineSales {
    pub online: Vec<RevenueProfitPoint>,
    pub offline: Vec<RevenueProfitPoint>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProductCard {
    pub product_id: String,
    pub product_name: String,
    pub product_image: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuickStats {
    pub page_reach: i64,
    pub repeating_customers: i64,
    pub conversion_rate: i64,
}

/// Sales as a whole-number percentage of page reach, truncated. Zero when no
/// reach has been recorded.
pub fn conversion_rate(sales: i64, page_reach: i64) -> i64 {
    if page_reach <= 0 {
        return 0;
    }
    sales.saturating_mul(100) / page_reach
}

pub struct AnalyticsService<S> {
    store: Arc<S>,
    engine: AggregationEngine<S>,
    revenue: RevenueCalculator<S>,
    page_reach: Arc<PageReachCounter>,
    asset_base_url: String,
}

impl<S: CommerceStore> AnalyticsService<S> {
    pub fn new(store: Arc<S>, page_reach: Arc<PageReachCounter>, asset_base_url: impl Into<String>) -> Self {
        Self {
            engine: AggregationEngine::new(store.clone()),
            revenue: RevenueCalculator::new(store.clone()),
            store,
            page_reach,
            asset_base_url: asset_base_url.into(),
        }
    }

    pub async fn monthly_revenue_profit(&self, source: OrderSource) -> Result<Vec<RevenueProfitPoint>> {
        self.monthly_revenue_profit_at(source, Utc::now().date_naive()).await
    }

    pub async fn monthly_revenue_profit_at(&self, source: OrderSource, today: NaiveDate) -> Result<Vec<RevenueProfitPoint>> {
        let summaries = self.engine.monthly_product_summaries(source).await?;
        self.revenue.revenue_profit_series(&summaries, today).await
    }

    pub async fn online_offline_sales(&self) -> Result<OnlineOfflineSales> {
        Ok(OnlineOfflineSales {
            online: self.monthly_revenue_profit(OrderSource::Online).await?,
            offline: self.monthly_revenue_profit(OrderSource::Offline).await?,
        })
    }

    /// Full ranking over all orders, image paths resolved against the asset
    /// base URL.
    pub async fn top_sellers(&self) -> Result<Vec<TopSeller>> {
        let summaries = self.engine.monthly_product_summaries(OrderSource::All).await?;
        let mut sellers = self.revenue.top_sellers(&summaries).await?;
        for seller in &mut sellers {
            if !seller.product_image.is_empty() {
                seller.product_image = join_url(&self.asset_base_url, &seller.product_image);
            }
        }
        Ok(sellers)
    }

    pub async fn new_arrivals(&self) -> Result<Vec<ProductCard>> {
        let products = self.store.products_newest_first().await?;
        Ok(products
            .into_iter()
            .map(|p| ProductCard {
                product_image: p.first_image().map(|img| join_url(&self.asset_base_url, img)),
                product_id: p.product_id,
                product_name: p.product_name,
            })
            .collect())
    }

    pub async fn pending_completed_counts(&self) -> Result<StatusCounts> { self.store.sale_status_counts().await }

    pub fn record_hit(&self) { self.page_reach.hit(); }

    /// Durable reach plus hits not yet flushed.
    ///
    /// Eventually consistent: while a flush is writing, its hits are neither
    /// pending nor durable yet, so a read in that window comes up short.
    pub async fn page_reach(&self) -> Result<i64> {
        let durable = self.store.page_reach().await?;
        Ok(durable + self.page_reach.pending())
    }

    pub async fn repeating_customers(&self) -> Result<i64> { self.store.repeating_customer_count().await }

    pub async fn conversion_rate(&self) -> Result<i64> {
        let sales = self.store.sale_count().await?;
        let reach = self.page_reach().await?;
        Ok(conversion_rate(sales, reach))
    }

    pub async fn quick_stats(&self) -> Result<QuickStats> {
        let page_reach = self.page_reach().await?;
        let repeating_customers = self.repeating_customers().await?;
        let sales = self.store.sale_count().await?;
        let stats = QuickStats { page_reach, repeating_customers, conversion_rate: conversion_rate(sales, page_reach) };
        debug!(?stats, "quick stats");
        Ok(stats)
    }

    pub async fn flush_page_reach(&self) -> Result<i64> { self.page_reach.flush(self.store.as_ref()).await }
}
