//! API Server Module
//!
//! REST surface for the batch fulfillment scheduler. Handlers translate HTTP
//! requests into orchestrator calls; the error mapping keeps the 1:1
//! taxonomy-to-status contract:
//! - `Validation`, `InvalidState`, `IllegalTransition` -> 400
//! - `NotFound`, `Unauthorized` -> 404 (collapsed, no cross-tenant leakage)
//! - storage failures -> 500
//!
//! OTP verification answers 200 with `success: false` for business-rule
//! failures; a wrong code is an expected customer outcome, not a server error.

use crate::batch::BatchOrchestrator;
use crate::config::Config;
use crate::types::{SchedulerError, ShopSchedule};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<BatchOrchestrator>,
    batch_page_size: usize,
}

/// The API server: owns the configuration and the shared state.
pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    pub fn new(config: Config, orchestrator: Arc<BatchOrchestrator>) -> Self {
        let state = AppState {
            orchestrator,
            batch_page_size: config.dashboard.batch_page_size,
        };
        Self { config, state }
    }

    /// Bind to the configured address and serve until shutdown.
    pub async fn start(self) -> anyhow::Result<()> {
        let app = Router::new()
            .route("/shops/:shop_id/schedule", put(update_schedule))
            .route("/shops/:shop_id/orders", post(place_order))
            .route("/shops/:shop_id/next-slot", get(next_slot))
            .route("/shops/:shop_id/slots", get(slots_with_availability))
            .route("/shops/:shop_id/dashboard", get(vendor_dashboard))
            .route("/shops/:shop_id/batches/:batch_id/lock", post(lock_batch))
            .route(
                "/shops/:shop_id/batches/:batch_id/start-delivery",
                post(start_delivery),
            )
            .route("/shops/:shop_id/batches/:batch_id/cancel", post(cancel_batch))
            .route(
                "/shops/:shop_id/orders/:order_id/verify-otp",
                post(verify_otp),
            )
            .with_state(self.state);

        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);
        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// Wrapper giving `SchedulerError` an HTTP representation.
struct ApiError(SchedulerError);

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            // Absent and not-yours are indistinguishable to the caller
            SchedulerError::NotFound | SchedulerError::Unauthorized => {
                (StatusCode::NOT_FOUND, "not found".to_string())
            }
            SchedulerError::InvalidState { .. }
            | SchedulerError::IllegalTransition { .. }
            | SchedulerError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            SchedulerError::Storage(e) => {
                error!("storage failure: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

fn now() -> chrono::NaiveDateTime {
    Local::now().naive_local()
}

#[derive(Deserialize)]
struct UpdateScheduleRequest {
    slots: Vec<NaiveTime>,
    enabled: bool,
    slot_capacity: Option<u32>,
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .update_schedule(ShopSchedule {
            shop_id,
            slots: request.slots,
            enabled: request.enabled,
            slot_capacity: request.slot_capacity,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct PlaceOrderRequest {
    order_id: String,
    display_id: String,
}

#[derive(Serialize)]
struct PlaceOrderResponse {
    order_id: String,
    status: crate::types::OrderStatus,
    batch_id: Option<String>,
}

async fn place_order(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Json(request): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<PlaceOrderResponse>), ApiError> {
    let (order, batch) = state
        .orchestrator
        .place_order(&shop_id, &request.order_id, &request.display_id, now())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(PlaceOrderResponse {
            order_id: order.id,
            status: order.status,
            batch_id: batch.map(|b| b.id),
        }),
    ))
}

async fn next_slot(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Json<crate::types::NextSlot>, ApiError> {
    let slot = state.orchestrator.next_slot(&shop_id, now()).await?;
    Ok(Json(slot))
}

async fn slots_with_availability(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
) -> Result<Json<Vec<crate::types::SlotAvailability>>, ApiError> {
    let slots = state
        .orchestrator
        .slots_with_availability(&shop_id, now())
        .await?;
    Ok(Json(slots))
}

#[derive(Deserialize)]
struct DashboardQuery {
    limit: Option<usize>,
    cursor: Option<String>,
}

async fn vendor_dashboard(
    State(state): State<AppState>,
    Path(shop_id): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<crate::types::DashboardView>, ApiError> {
    let limit = query.limit.unwrap_or(state.batch_page_size);
    let view = state
        .orchestrator
        .vendor_dashboard(&shop_id, now(), limit, query.cursor.as_deref())
        .await?;
    Ok(Json(view))
}

#[derive(Serialize)]
struct OpResponse {
    message: String,
}

async fn lock_batch(
    State(state): State<AppState>,
    Path((shop_id, batch_id)): Path<(String, String)>,
) -> Result<Json<OpResponse>, ApiError> {
    state.orchestrator.lock(&batch_id, &shop_id).await?;
    Ok(Json(OpResponse {
        message: "batch locked".to_string(),
    }))
}

async fn start_delivery(
    State(state): State<AppState>,
    Path((shop_id, batch_id)): Path<(String, String)>,
) -> Result<Json<OpResponse>, ApiError> {
    state.orchestrator.start_delivery(&batch_id, &shop_id).await?;
    Ok(Json(OpResponse {
        message: "batch out for delivery".to_string(),
    }))
}

#[derive(Deserialize)]
struct CancelRequest {
    reason: String,
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled_orders: u64,
    message: String,
}

async fn cancel_batch(
    State(state): State<AppState>,
    Path((shop_id, batch_id)): Path<(String, String)>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = state
        .orchestrator
        .cancel(&batch_id, &shop_id, &request.reason)
        .await?;
    Ok(Json(CancelResponse {
        cancelled_orders: cancelled,
        message: "batch cancelled".to_string(),
    }))
}

#[derive(Deserialize)]
struct VerifyOtpRequest {
    code: String,
}

async fn verify_otp(
    State(state): State<AppState>,
    Path((shop_id, order_id)): Path<(String, String)>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<crate::types::VerifyOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .verify_otp(&order_id, &request.code, &shop_id)
        .await?;
    Ok(Json(outcome))
}
