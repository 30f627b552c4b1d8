//! `/order` routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, AuthenticatedUser};
use crate::checkout::{CheckoutOutcome, CheckoutRequest, OfflineCheckoutRequest};
use crate::domain::aggregates::{ConfirmationStatus, OrderStatus};
use crate::invoice::Invoice;
use crate::lifecycle::StatusUpdate;
use crate::store::{CommerceStore, OrderHistoryEntry, SaleListing};

pub(super) fn routes<S: CommerceStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/checkout", post(checkout::<S>))
        .route("/offline-checkout", post(offline_checkout::<S>))
        .route("/order-history", get(order_history::<S>))
        .route("/generate-invoice", post(generate_invoice::<S>).get(generate_invoice::<S>))
        .route("/update-order-confirmation", put(update_confirmation::<S>))
        .route("/update-order-status", put(update_order_status::<S>))
        .route("/sales", get(list_sales::<S>))
}

fn outcome_response(outcome: CheckoutOutcome) -> Response {
    let status = match outcome {
        CheckoutOutcome::Placed { .. } => StatusCode::OK,
        CheckoutOutcome::NoCartFound | CheckoutOutcome::ValidationFailed { .. } | CheckoutOutcome::Failed => {
            StatusCode::BAD_REQUEST
        }
    };
    (status, Json(outcome)).into_response()
}

async fn checkout<S: CommerceStore>(
    State(s): State<AppState<S>>,
    AuthenticatedUser(username): AuthenticatedUser,
    Json(request): Json<CheckoutRequest>,
) -> Response {
    outcome_response(s.checkout.checkout(&username, &request).await)
}

async fn offline_checkout<S: CommerceStore>(
    State(s): State<AppState<S>>,
    Json(request): Json<OfflineCheckoutRequest>,
) -> Response {
    outcome_response(s.checkout.offline_checkout(&request).await)
}

async fn order_history<S: CommerceStore>(
    State(s): State<AppState<S>>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> Result<Json<Vec<OrderHistoryEntry>>, ApiError> {
    Ok(Json(s.checkout.order_history(&username).await?))
}

#[derive(Debug, Deserialize)]
struct InvoiceParams {
    #[serde(rename = "saleID")]
    sale_id: String,
}

async fn generate_invoice<S: CommerceStore>(
    State(s): State<AppState<S>>,
    Query(params): Query<InvoiceParams>,
) -> Result<Json<Invoice>, ApiError> {
    s.invoices
        .generate(&params.sale_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no invoice for sale {}", params.sale_id)))
}

#[derive(Debug, Deserialize)]
struct StatusChangeRequest {
    sale_id: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct StatusChangeResponse {
    #[serde(flatten)]
    outcome: StatusUpdate,
    rows_updated: i64,
}

fn status_response(outcome: StatusUpdate) -> Response {
    let status = match outcome {
        StatusUpdate::Applied | StatusUpdate::Unchanged => StatusCode::OK,
        StatusUpdate::NotFound => StatusCode::NOT_FOUND,
        StatusUpdate::Rejected { .. } => StatusCode::CONFLICT,
        StatusUpdate::Failed => StatusCode::BAD_REQUEST,
    };
    let rows_updated = outcome.rows_updated();
    (status, Json(StatusChangeResponse { outcome, rows_updated })).into_response()
}

async fn update_confirmation<S: CommerceStore>(
    State(s): State<AppState<S>>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Response, ApiError> {
    let status: ConfirmationStatus = request.status.parse()?;
    Ok(status_response(s.lifecycle.update_confirmation_status(&request.sale_id, status).await))
}

async fn update_order_status<S: CommerceStore>(
    State(s): State<AppState<S>>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Response, ApiError> {
    let status: OrderStatus = request.status.parse()?;
    Ok(status_response(s.lifecycle.update_order_status(&request.sale_id, status).await))
}

async fn list_sales<S: CommerceStore>(State(s): State<AppState<S>>) -> Result<Json<Vec<SaleListing>>, ApiError> {
    Ok(Json(s.checkout.list_sales().await?))
}
