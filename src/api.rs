//! HTTP API handlers for shieldstats.
//!
//! - **POST /records**: Record activity into a category's hourly bucket.
//! - **DELETE /records**: Reset all statistics.
//! - **GET /chart**: Downsampled chart for one category and window.
//! - **GET /chart/live**: Latest snapshot kept warm by the chart refresher.
//! - **PUT /chart/live/window**: Switch the refresher's window.
//! - **GET /stats/lifetime**: Lifetime counters (seen, blocked, data saved).
//! - **GET /health**: Health check.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::aggregation::{ChartSnapshot, downsample_at};
use crate::model::{
    ChartPoint, ChartQuery, LifetimeStats, RecordRequest, RequestRecord, StatisticsCategory,
    TimeWindow, WindowRequest, hour_bucket,
};
use crate::refresh::ChartFeed;
use crate::storage::Storage;
use crate::window::WindowBounds;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub storage: Storage,
    pub chart: Option<ChartFeed>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/records", post(post_record).delete(delete_records))
        .route("/chart", get(get_chart))
        .route("/chart/live", get(get_live_chart))
        .route("/chart/live/window", put(put_live_window))
        .route("/stats/lifetime", get(get_lifetime_stats))
        .route("/health", get(health_check))
        .with_state(state)
}

/// POST /records - Record request activity.
///
/// # Request Body
///
/// ```json
/// {
///     "category": "blocked",
///     "timestamp": "2026-10-19T10:24:00Z",
///     "request_count": 3,
///     "saved_kilobytes": 42
/// }
/// ```
///
/// Only `category` is required. The timestamp defaults to now and is
/// truncated to the start of its hour. Counts must lie in
/// `0..=MAX_RECORD_COUNT`.
///
/// # Response
///
/// Returns `202 Accepted` on success, `422 Unprocessable Entity` for
/// out-of-range counts.
#[instrument(skip(state, request))]
pub async fn post_record(
    State(state): State<AppState>,
    Json(request): Json<RecordRequest>,
) -> impl IntoResponse {
    if let Err(e) = request.validate() {
        warn!(category = %request.category, error = %e, "Rejected request record");
        return StatusCode::UNPROCESSABLE_ENTITY;
    }

    let record = RequestRecord {
        date: hour_bucket(request.timestamp.unwrap_or_else(Utc::now)),
        request_count: request.request_count,
        saved_kilobytes: request.saved_kilobytes,
    };

    match state.storage.insert_record(request.category, &record).await {
        Ok(()) => {
            info!(
                category = %request.category,
                bucket = %record.date,
                request_count = record.request_count,
                "Request record stored"
            );
            StatusCode::ACCEPTED
        }
        Err(e) => {
            warn!(
                category = %request.category,
                error = %e,
                "Failed to store request record"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// DELETE /records - Remove every stored record.
#[instrument(skip(state))]
pub async fn delete_records(State(state): State<AppState>) -> StatusCode {
    match state.storage.reset_statistics().await {
        Ok(()) => {
            info!("Statistics reset");
            StatusCode::NO_CONTENT
        }
        Err(e) => {
            warn!(error = %e, "Failed to reset statistics");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Response for GET /chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartResponse {
    pub category: StatisticsCategory,
    pub window: TimeWindow,
    pub bounds: Option<WindowBounds>,
    pub points: Vec<ChartPoint>,
    pub request_total: i64,
    pub saved_kilobytes: i64,
}

/// GET /chart - Downsampled chart for one category.
///
/// # Query Parameters
///
/// - `window` (optional): day, week, month, year or all_time (default: day)
/// - `category` (optional): all or blocked (default: all)
///
/// # Response
///
/// ```json
/// {
///     "category": "blocked",
///     "window": "week",
///     "bounds": {"begin": "...", "end": "...", "begin_label": "Mon 12", "end_label": "Mon 19"},
///     "points": [{"x": 0, "y": 12}, {"x": 1, "y": 7}],
///     "request_total": 19,
///     "saved_kilobytes": 310
/// }
/// ```
#[instrument(skip(state))]
pub async fn get_chart(
    State(state): State<AppState>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartResponse>, StatusCode> {
    let records = state
        .storage
        .read_category(query.category)
        .await
        .map_err(|e| {
            warn!(category = %query.category, error = %e, "Failed to read statistics");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let now = Utc::now();
    let dates: Vec<_> = records.iter().map(|r| r.date).collect();
    let bounds = query.window.resolve(&dates, now);
    let result = downsample_at(&records, query.window, now);

    info!(
        category = %query.category,
        window = %query.window,
        records = records.len(),
        points = result.points.len(),
        "Chart queried"
    );

    Ok(Json(ChartResponse {
        category: query.category,
        window: query.window,
        bounds,
        points: result.points,
        request_total: result.request_total,
        saved_kilobytes: result.saved_kilobytes,
    }))
}

/// GET /chart/live - Latest snapshot from the chart refresher.
///
/// Returns `503 Service Unavailable` if no refresher is running or it has
/// not produced a snapshot yet.
#[instrument(skip(state))]
pub async fn get_live_chart(
    State(state): State<AppState>,
) -> Result<Json<ChartSnapshot>, StatusCode> {
    let feed = state.chart.as_ref().ok_or_else(|| {
        warn!("Chart refresher not configured");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    let snapshot = feed.latest().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    Ok(Json(snapshot.as_ref().clone()))
}

/// PUT /chart/live/window - Change the window the refresher charts.
#[instrument(skip(state))]
pub async fn put_live_window(
    State(state): State<AppState>,
    Json(request): Json<WindowRequest>,
) -> StatusCode {
    let Some(feed) = state.chart.as_ref() else {
        warn!("Chart refresher not configured");
        return StatusCode::SERVICE_UNAVAILABLE;
    };

    feed.set_window(request.window);
    info!(window = %request.window, "Live chart window changed");
    StatusCode::NO_CONTENT
}

/// GET /stats/lifetime - Requests seen, requests blocked and data saved.
#[instrument(skip(state))]
pub async fn get_lifetime_stats(
    State(state): State<AppState>,
) -> Result<Json<LifetimeStats>, StatusCode> {
    match state.storage.lifetime_stats().await {
        Ok(stats) => {
            info!(
                requests_total = stats.requests_total,
                blocked_total = stats.blocked_total,
                saved_kilobytes = stats.saved_kilobytes,
                "Lifetime stats queried"
            );
            Ok(Json(stats))
        }
        Err(e) => {
            warn!(error = %e, "Failed to compute lifetime stats");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
