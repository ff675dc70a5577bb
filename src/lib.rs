//! Habwatch - friend activity change detection for retro hotel profiles
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Tracker invocation (populate / process / stats)          │
//! │  - Tracked user registry, activity feed                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Tracker Pipeline                          │
//! │  - Queue populator, change detector, worker pool            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │     Data Layer           │   │      Hotel API Client        │
//! │  - SQLite (sqlx)         │   │  - reqwest, public endpoints │
//! └──────────────────────────┘   └──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers for tracker invocation and the activity feed
//! - `tracker`: populator, change detector, and batch worker pool
//! - `hotel`: public hotel API client
//! - `data`: database layer
//! - `config`: configuration management
//! - `error`: error types

pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod hotel;
pub mod metrics;
pub mod tracker;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the database pool and HTTP client.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Hotel API profile source
    pub hotel: Arc<dyn hotel::ProfileSource>,

    /// Shared HTTP client
    pub http_client: Arc<reqwest::Client>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database and run migrations
    /// 2. Build the shared HTTP client
    /// 3. Wrap it in the hotel API client
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!("Database connected");

        // 2. Build HTTP client
        let http_client = reqwest::Client::builder()
            .user_agent(config.hotel_api.user_agent.clone())
            .timeout(std::time::Duration::from_secs(
                config.hotel_api.request_timeout_seconds,
            ))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;
        let http_client = Arc::new(http_client);

        // 3. Hotel API client shares the reqwest pool
        let hotel_client = hotel::HotelApiClient::new(http_client.clone());

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db: Arc::new(db),
            hotel: Arc::new(hotel_client),
            http_client,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::tracker_router())
        .nest("/api", api::users_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(track_http_metrics))
        .with_state(state)
        .merge(api::metrics_router())
}

/// Count every request by method, matched route, and response status.
///
/// Uses the matched route template (not the raw path) to keep the
/// label cardinality bounded.
async fn track_http_metrics(
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();

    response
}

async fn health_check() -> &'static str {
    "OK"
}
