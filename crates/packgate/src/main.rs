use std::path::PathBuf;
use std::sync::Arc;

use packgate::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), PackgateError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("packgate.toml"));
    let settings = Settings::load_or_create(&path)?;
    settings.log_summary();

    let store: Arc<dyn PersistenceStore> = match settings.bridge.database_path() {
        Some(db_path) => Arc::new(RedbStore::open(&db_path)?),
        None => {
            tracing::warn!("no data_dir configured, acceptances are forgotten on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let server = PackgateServerBuilder::new()
        .settings(&settings)
        .build(store)
        .await?;

    server.run_until(shutdown_signal()).await?;

    // Last store handle dropped with the server: redb flushes on close.
    tracing::info!("packgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "cannot listen for ctrl-c, running until killed");
            std::future::pending::<()>().await;
        }
    }
}
