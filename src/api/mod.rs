//! HTTP surface for the storefront clients and the admin dashboard.

mod analysis;
mod orders;

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tracing::error;

use crate::analytics::{AnalyticsService, PageReachCounter};
use crate::checkout::CheckoutWorkflow;
use crate::config::CompanyProfile;
use crate::invoice::InvoiceGenerator;
use crate::lifecycle::OrderLifecycleManager;
use crate::notify::EventPublisher;
use crate::store::CommerceStore;
use crate::CommerceError;

/// Header carrying the username authenticated by the upstream gateway.
pub const AUTH_USER_HEADER: &str = "x-authenticated-user";

pub struct AppState<S> {
    pub analytics: Arc<AnalyticsService<S>>,
    pub checkout: Arc<CheckoutWorkflow<S>>,
    pub lifecycle: Arc<OrderLifecycleManager<S>>,
    pub invoices: Arc<InvoiceGenerator<S>>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            analytics: self.analytics.clone(),
            checkout: self.checkout.clone(),
            lifecycle: self.lifecycle.clone(),
            invoices: self.invoices.clone(),
        }
    }
}

impl<S: CommerceStore> AppState<S> {
    pub fn new(
        store: Arc<S>,
        events: EventPublisher,
        page_reach: Arc<PageReachCounter>,
        asset_base_url: &str,
        company: CompanyProfile,
    ) -> Self {
        Self {
            analytics: Arc::new(AnalyticsService::new(store.clone(), page_reach, asset_base_url)),
            checkout: Arc::new(CheckoutWorkflow::new(store.clone(), events.clone(), asset_base_url)),
            lifecycle: Arc::new(OrderLifecycleManager::new(store.clone(), events)),
            invoices: Arc::new(InvoiceGenerator::new(store, company)),
        }
    }
}

pub fn router<S: CommerceStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "storefront"})) }))
        .nest("/analysis", analysis::routes())
        .nest("/order", orders::routes())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Commerce(#[from] CommerceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) | ApiError::Commerce(CommerceError::InvalidStatus(_)) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Commerce(e) => {
                error!(error = %e, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Username of the caller, as vouched for by the auth gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

#[axum::async_trait]
impl<St: Send + Sync> FromRequestParts<St> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTH_USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AuthenticatedUser(v.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}
