//! Shieldstats - request statistics and usage charts for an ad-blocking /
//! DNS-filtering service.
//!
//! # API Endpoints
//!
//! - `POST /records` - Record request activity
//! - `DELETE /records` - Reset all statistics
//! - `GET /chart` - Downsampled chart for a category and window
//! - `GET /chart/live` - Latest chart snapshot from the refresher
//! - `PUT /chart/live/window` - Change the refresher's window
//! - `GET /stats/lifetime` - Lifetime counters
//! - `GET /health` - Health check

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use shieldstats::api::{AppState, router};
use shieldstats::model::TimeWindow;
use shieldstats::refresh::spawn_chart_refresher;
use shieldstats::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:shieldstats.db?mode=rwc";

/// Default chart refresh period in seconds.
const DEFAULT_REFRESH_SECONDS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("shieldstats=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("SHIELDSTATS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url =
        env::var("SHIELDSTATS_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    let refresh_seconds: u64 = env::var("SHIELDSTATS_REFRESH_SECONDS")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|&s| s > 0)
        .unwrap_or(DEFAULT_REFRESH_SECONDS);

    let window: TimeWindow = match env::var("SHIELDSTATS_CHART_WINDOW") {
        Ok(value) => value.parse()?,
        Err(_) => TimeWindow::default(),
    };

    info!(port, db_url = %db_url, refresh_seconds, window = %window, "Starting shieldstats");

    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    let (chart, _refresher) = spawn_chart_refresher(
        storage.clone(),
        window,
        Duration::from_secs(refresh_seconds),
    );

    let state = AppState {
        storage,
        chart: Some(chart),
    };
    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Shieldstats is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
