//! Habwatch binary entry point

use habwatch::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Initialize tracing/logging
/// 2. Load configuration from file and environment
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background scheduler (optional)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize tracing/logging
    let log_format =
        std::env::var("HABWATCH__LOGGING__FORMAT").unwrap_or_else(|_| "pretty".to_string());

    if log_format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "habwatch=info,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "habwatch=info,tower_http=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting Habwatch...");

    // 2. Initialize metrics
    habwatch::metrics::init_metrics();

    // 3. Load configuration
    let config = config::AppConfig::load()?;
    tracing::info!(
        database = %config.database.path.display(),
        "Configuration loaded"
    );

    // 4. Initialize application state
    let state = AppState::new(config.clone()).await?;

    // 5. Build Axum router
    let app = habwatch::build_router(state.clone());

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    // 7. Start background tasks
    if config.tracker.scheduler_enabled {
        spawn_scheduler_task(state.clone());
    }

    // Start server
    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn the background queue-processing scheduler
///
/// Drives process_queue cycles on an interval so the binary can run
/// standalone. External invocation via POST /tracker works either way.
fn spawn_scheduler_task(state: AppState) {
    tokio::spawn(async move {
        let interval_secs = state.config.tracker.scheduler_interval_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick so the first cycle waits one interval.
        interval.tick().await;

        loop {
            interval.tick().await;

            tracing::info!("Running scheduled queue cycle...");
            match habwatch::tracker::run_cycle(
                state.db.clone(),
                state.hotel.clone(),
                &state.config.tracker,
                state.config.tracker.batch_size,
            )
            .await
            {
                Ok(report) => {
                    tracing::info!(
                        processed = report.processed,
                        activities = report.activities_detected,
                        failures = report.failures,
                        "Scheduled cycle completed"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Scheduled cycle failed");
                }
            }
        }
    });

    tracing::info!("Scheduler task spawned");
}
