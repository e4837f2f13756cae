// ============================================================================
// Exchange Config - configuration for the B2B message exchange pipeline
// ============================================================================
//
// Everything is loaded from environment variables (optionally via a .env
// file) with defaults that work for local development.
//
// ============================================================================

mod constants;
mod database;
mod exchange;
mod housekeeping;
mod kafka;
mod object_storage;

pub use constants::{DEFAULT_ALLOWED_MEDIA_TYPES, MAX_REQUEST_BODY_SIZE, MILLIS_PER_SECOND};
pub use database::DbConfig;
pub use exchange::ExchangeConfig;
pub use housekeeping::HousekeepingConfig;
pub use kafka::{KafkaConfig, TopicConfig};
pub use object_storage::{
    BucketNames, FallbackStorageConfig, ObjectStorageConfig, StorageConnection,
};

use anyhow::{Context, Result};

/// Main configuration structure for the exchange services
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,

    pub db: DbConfig,
    pub kafka: KafkaConfig,
    pub object_storage: ObjectStorageConfig,
    pub housekeeping: HousekeepingConfig,
    pub exchange: ExchangeConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),

            db: DbConfig::from_env(),
            kafka: KafkaConfig::from_env(),
            object_storage: ObjectStorageConfig::from_env(),
            housekeeping: HousekeepingConfig::from_env(),
            exchange: ExchangeConfig::from_env(),
        })
    }
}
