//! verso-engine binary
//!
//! Opens the shared database, recovers state left by a previous process, and
//! runs the translate worker pool until interrupted.

use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use verso_common::events::EventBus;
use verso_engine::services::HttpTranslator;
use verso_engine::{db, workflow, EngineConfig, EngineState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting verso-engine");

    // Data directory: CLI argument, then VERSO_DATA_DIR, then shared config
    let cli_data_dir = std::env::args().nth(1);
    let data_dir = verso_common::config::resolve_data_dir(cli_data_dir.as_deref(), "VERSO_DATA_DIR")?;
    verso_common::config::ensure_data_dir(&data_dir)?;

    let db_path = verso_common::config::database_path(&data_dir);
    let pool = db::init_database(&db_path).await?;

    // Jobs and runs left active by a previous process have no owning worker
    let stale_jobs = db::jobs::cleanup_stale_jobs(&pool).await?;
    let stale_runs = db::workflow_runs::cleanup_stale_runs(&pool).await?;
    if stale_jobs > 0 || stale_runs > 0 {
        tracing::warn!(stale_jobs, stale_runs, "Recovered stale work from previous process");
    }

    let config = EngineConfig::from_env();
    let event_bus = EventBus::new(config.event_capacity);

    let translator = Arc::new(HttpTranslator::new(
        config.model_base_url.clone(),
        config.model_api_key.clone(),
        config.model_timeout_secs,
    )?);

    let state = EngineState::new(pool, event_bus, translator, config);

    let workers = workflow::worker::spawn_workers(state);

    tracing::info!("verso-engine running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    for worker in workers {
        worker.abort();
    }

    Ok(())
}
