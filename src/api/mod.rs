//! Control API
//!
//! A small REST surface for operators: feed status, subscription management,
//! manual reconciliation and Prometheus metrics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Path, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::{Error, ErrorCategory, RelayErrorTrait};
use crate::feeds::validate_criteria;
use crate::metrics;
use crate::models::{FeedKind, ReconcileReport, Subscription};
use crate::scheduler::{Engine, SchedulerError};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub feeds: Vec<FeedKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionQuery {
    pub community: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub community_id: String,
    pub target_channel_id: String,
    #[serde(default)]
    pub match_criteria: serde_json::Value,
    pub ping_target_id: Option<String>,
}

/// Saved subscription plus the result of the immediate reconciliation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResponse {
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<ReconcileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile_error: Option<String>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/feeds", get(list_feeds))
        .route("/api/feeds/{feed}/trigger/{community}", post(trigger_feed))
        .route("/api/subscriptions/{feed}", get(list_subscriptions).put(subscribe))
        .route("/api/subscriptions/id/{id}", delete(unsubscribe))
        .route("/metrics", get(metrics_endpoint))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
pub async fn serve(
    addr: SocketAddr,
    engine: Arc<Engine>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> crate::error::Result<()> {
    let router = create_router(AppState::new(engine)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "Control API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Control API stopped");
    Ok(())
}

async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(request).await;
    metrics::record_api_request(&endpoint, response.status().as_u16());
    response
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::failure(message))).into_response()
}

fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Scheduler(SchedulerError::UnknownFeed { .. }) => StatusCode::NOT_FOUND,
        Error::Scheduler(SchedulerError::FeedDisabled { .. }) => StatusCode::CONFLICT,
        _ => match error.category() {
            ErrorCategory::Network | ErrorCategory::Classification => StatusCode::BAD_GATEWAY,
            ErrorCategory::Storage => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

fn parse_feed(raw: &str, status: StatusCode) -> Result<FeedKind, Response> {
    raw.parse::<FeedKind>().map_err(|e| failure(status, e))
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        feeds: state.engine.feeds(),
    }))
}

async fn list_feeds(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.engine.statuses().await))
}

async fn list_subscriptions(
    State(state): State<AppState>,
    Path(feed): Path<String>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    let kind = match parse_feed(&feed, StatusCode::NOT_FOUND) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    let store = state.engine.store();
    let listed = match query.community.as_deref() {
        Some(community) => store.list_by_community(kind, community),
        None => store.list_all(kind),
    };

    match listed {
        Ok(subscriptions) => (StatusCode::OK, Json(ApiResponse::success(subscriptions))).into_response(),
        Err(e) => failure(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")),
    }
}

/// Upsert a subscription, then refresh that community right away
async fn subscribe(
    State(state): State<AppState>,
    Path(feed): Path<String>,
    Json(request): Json<SubscribeRequest>,
) -> Response {
    let kind = match parse_feed(&feed, StatusCode::BAD_REQUEST) {
        Ok(kind) => kind,
        Err(response) => return response,
    };

    if request.community_id.trim().is_empty() || request.target_channel_id.trim().is_empty() {
        return failure(
            StatusCode::BAD_REQUEST,
            "communityId and targetChannelId are required",
        );
    }

    if let Err(e) = validate_criteria(kind, &request.match_criteria) {
        return failure(StatusCode::BAD_REQUEST, format!("Invalid criteria: {e}"));
    }

    let subscription = match state.engine.store().upsert(
        kind,
        &request.community_id,
        &request.target_channel_id,
        &request.match_criteria,
        request.ping_target_id.as_deref(),
    ) {
        Ok(subscription) => subscription,
        Err(e) => return failure(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")),
    };

    tracing::info!(
        feed = kind.as_str(),
        subscription_id = %subscription.subscription_id,
        community_id = %subscription.community_id,
        "Subscription saved"
    );

    let (report, reconcile_error) = match state
        .engine
        .trigger_manual_reconcile(kind.as_str(), &subscription.community_id)
        .await
    {
        Ok(report) => (Some(report), None),
        Err(e) => {
            tracing::warn!(
                feed = kind.as_str(),
                community_id = %subscription.community_id,
                error = %e,
                "Immediate reconciliation failed"
            );
            (None, Some(e.localized_desc()))
        }
    };

    // Re-read so the response carries the message reference just delivered
    let subscription = match state.engine.store().get(&subscription.subscription_id) {
        Ok(Some(fresh)) => fresh,
        _ => subscription,
    };

    let body = SubscribeResponse {
        subscription,
        report,
        reconcile_error,
    };
    (StatusCode::OK, Json(ApiResponse::success(body))).into_response()
}

async fn unsubscribe(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.store().delete(&id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::success(id))).into_response(),
        Ok(false) => failure(StatusCode::NOT_FOUND, format!("Subscription not found: {id}")),
        Err(e) => failure(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")),
    }
}

async fn trigger_feed(
    State(state): State<AppState>,
    Path((feed, community)): Path<(String, String)>,
) -> Response {
    match state.engine.trigger_manual_reconcile(&feed, &community).await {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
        Err(e) => {
            tracing::warn!(feed = %feed, community_id = %community, error = %e, "Manual reconciliation rejected");
            failure(error_status(&e), e.localized_desc())
        }
    }
}

async fn metrics_endpoint() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
