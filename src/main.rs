mod api;
mod config;
mod consistency;
mod dashboard;
mod db;
mod error;
mod normalizer;
mod store;
mod types;

use std::sync::Arc;

use chrono::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::{Config, StoreBackend};
use crate::consistency::{ConsistencyService, PendingPolicy};
use crate::dashboard::DashboardService;
use crate::error::{AppError, Result};
use crate::store::{MemoryStore, ReadingStore, SqliteStore};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Reading store ---
    let store: Arc<dyn ReadingStore> = match cfg.store_backend {
        StoreBackend::Sqlite => {
            let sqlite = SqliteStore::connect(&cfg.db_path).await?;
            sqlite.migrate().await?;
            info!("Database ready at {}", cfg.db_path);
            Arc::new(sqlite) as Arc<dyn ReadingStore>
        }
        StoreBackend::Memory => {
            warn!("STORE_BACKEND=memory is a smoke-test mode: every station is unknown");
            MemoryStore::new() as Arc<dyn ReadingStore>
        }
    };

    // --- Services ---
    let health = Arc::new(HealthState::new());
    let pending_policy = match cfg.pending_review_hours {
        Some(hours) => PendingPolicy::AwaitReview {
            window: Duration::try_hours(hours).ok_or_else(|| {
                AppError::Config(format!("PENDING_REVIEW_HOURS={hours} is out of range"))
            })?,
        },
        None => PendingPolicy::ValidByDefault,
    };
    info!(
        timezone = %cfg.timezone,
        ?pending_policy,
        pollutant = %cfg.directional_pollutant,
        "Services configured"
    );

    let consistency = Arc::new(ConsistencyService::new(
        Arc::clone(&store),
        Arc::clone(&health),
        cfg.timezone,
        pending_policy,
    ));
    let dashboard = Arc::new(DashboardService::new(
        Arc::clone(&store),
        Arc::clone(&consistency),
        Arc::clone(&health),
        cfg.timezone,
        cfg.directional_pollutant.clone(),
    ));

    // --- HTTP API server ---
    let api_state = ApiState {
        consistency,
        dashboard,
        health,
        reconcile_latency: Arc::new(LatencyStats::new()),
        dashboard_latency: Arc::new(LatencyStats::new()),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
