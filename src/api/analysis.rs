//! `/analysis` routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use super::{ApiError, AppState};
use crate::analytics::{OnlineOfflineSales, ProductCard, QuickStats, RevenueProfitPoint, TopSeller};
use crate::store::{CommerceStore, OrderSource, StatusCounts};

/// Entries shown on the storefront's home page lists.
const HOME_PAGE_LIMIT: usize = 5;

pub(super) fn routes<S: CommerceStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/monthly-sales", get(monthly_sales::<S>))
        .route("/top-sellers", get(top_sellers::<S>))
        .route("/dash/top-sellers", get(all_top_sellers::<S>))
        .route("/new-arrivals", get(new_arrivals::<S>))
        .route("/online-offline-sales", get(online_offline_sales::<S>))
        .route("/pending-complete-order-count", get(pending_completed::<S>))
        .route("/hit", get(hit::<S>))
        .route("/page-reach", get(page_reach::<S>))
        .route("/returning-customers", get(returning_customers::<S>))
        .route("/quick-stats", get(quick_stats::<S>))
}

async fn monthly_sales<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<Vec<RevenueProfitPoint>>, ApiError> {
    Ok(Json(s.analytics.monthly_revenue_profit(OrderSource::All).await?))
}

async fn top_sellers<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<Vec<TopSeller>>, ApiError> {
    let mut sellers = s.analytics.top_sellers().await?;
    sellers.truncate(HOME_PAGE_LIMIT);
    Ok(Json(sellers))
}

async fn all_top_sellers<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<Vec<TopSeller>>, ApiError> {
    Ok(Json(s.analytics.top_sellers().await?))
}

async fn new_arrivals<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<Vec<ProductCard>>, ApiError> {
    let mut cards = s.analytics.new_arrivals().await?;
    cards.truncate(HOME_PAGE_LIMIT);
    Ok(Json(cards))
}

async fn online_offline_sales<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<OnlineOfflineSales>, ApiError> {
    Ok(Json(s.analytics.online_offline_sales().await?))
}

async fn pending_completed<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<StatusCounts>, ApiError> {
    Ok(Json(s.analytics.pending_completed_counts().await?))
}

async fn hit<S: CommerceStore>(State(s): State<AppState<S>>) -> StatusCode {
    s.analytics.record_hit();
    StatusCode::OK
}

async fn page_reach<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<i64>, ApiError> {
    Ok(Json(s.analytics.page_reach().await?))
}

async fn returning_customers<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<i64>, ApiError> {
    Ok(Json(s.analytics.repeating_customers().await?))
}

async fn quick_stats<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<QuickStats>, ApiError> {
    Ok(Json(s.analytics.quick_stats().await?))
}
