// ============================================================================
// Housekeeping Configuration
// ============================================================================

use crate::constants::*;

/// Retention settings shared by the message-log purge and the bucket lifecycle rule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HousekeepingConfig {
    pub enabled: bool,
    pub batch_size: u32,
    pub max_batches: u32,
    pub expiration_days: u32,
    /// How often the worker runs a purge (seconds)
    pub interval_secs: u64,
}

impl HousekeepingConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: std::env::var("HOUSEKEEPING_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            batch_size: std::env::var("HOUSEKEEPING_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(DEFAULT_HOUSEKEEPING_BATCH_SIZE),
            max_batches: std::env::var("HOUSEKEEPING_MAX_BATCHES")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(DEFAULT_HOUSEKEEPING_MAX_BATCHES),
            expiration_days: std::env::var("HOUSEKEEPING_EXPIRATION_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &u32| *v > 0)
                .unwrap_or(DEFAULT_HOUSEKEEPING_EXPIRATION_DAYS),
            interval_secs: std::env::var("HOUSEKEEPING_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_HOUSEKEEPING_INTERVAL_SECS),
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: DEFAULT_HOUSEKEEPING_BATCH_SIZE,
            max_batches: DEFAULT_HOUSEKEEPING_MAX_BATCHES,
            expiration_days: DEFAULT_HOUSEKEEPING_EXPIRATION_DAYS,
            interval_secs: DEFAULT_HOUSEKEEPING_INTERVAL_SECS,
        }
    }
}
