use anyhow::Result;
use b2b_exchange::db;
use b2b_exchange::housekeeping::HousekeepingService;
use b2b_exchange::message_log::PostgresMessageLog;
use exchange_config::Config;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.rust_log.clone()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting housekeeping worker");

    let pool = db::create_pool(&config.database_url, &config.db).await?;
    db::health_check(&pool).await?;
    db::run_migrations(&pool).await?;
    info!("Connected to database");

    let message_log = Arc::new(PostgresMessageLog::new(pool));
    let service = HousekeepingService::new(message_log, config.housekeeping.clone());

    tokio::select! {
        _ = service.run() => {
            info!("Housekeeping task finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    Ok(())
}
