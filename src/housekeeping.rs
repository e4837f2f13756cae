use std::sync::Arc;
use std::time::Duration;

use exchange_config::HousekeepingConfig;
use exchange_metrics::{HOUSEKEEPING_BATCHES_DELETED, HOUSEKEEPING_BATCH_CAP_REACHED};
use tokio::time;

use crate::error::ExchangeResult;
use crate::message_log::MessageLog;

/// Summary of one purge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    /// Batches that deleted at least one row
    pub batches_deleted: u32,
    /// Stopped because `max_batches` was reached, not because nothing was left
    pub cap_reached: bool,
}

/// Deletes message-log rows older than the retention period, in bounded
/// batches so a long backlog never holds one huge transaction.
///
/// Payloads are removed separately by the bucket lifecycle rule.
pub struct HousekeepingService {
    message_log: Arc<dyn MessageLog>,
    config: HousekeepingConfig,
}

impl HousekeepingService {
    pub fn new(message_log: Arc<dyn MessageLog>, config: HousekeepingConfig) -> Self {
        Self {
            message_log,
            config,
        }
    }

    pub async fn cleanup_expired_messages(&self) -> ExchangeResult<PurgeReport> {
        let mut batches_deleted = 0;

        while batches_deleted < self.config.max_batches {
            let deleted = self
                .message_log
                .delete_expired_batch(self.config.expiration_days, self.config.batch_size)
                .await?;
            if !deleted {
                break;
            }
            batches_deleted += 1;
            HOUSEKEEPING_BATCHES_DELETED.inc();
        }

        let cap_reached = batches_deleted >= self.config.max_batches;
        if cap_reached {
            HOUSEKEEPING_BATCH_CAP_REACHED.inc();
            tracing::warn!(
                max_batches = self.config.max_batches,
                batch_size = self.config.batch_size,
                "Housekeeping stopped at the batch limit, expired messages remain"
            );
        } else if batches_deleted > 0 {
            tracing::info!(
                batches_deleted = batches_deleted,
                expiration_days = self.config.expiration_days,
                "Cleaned up expired messages"
            );
        } else {
            tracing::debug!("No expired messages to clean up");
        }

        Ok(PurgeReport {
            batches_deleted,
            cap_reached,
        })
    }

    /// Run the purge on a fixed interval, forever.
    pub async fn run(self) {
        if !self.config.enabled {
            tracing::info!("Housekeeping disabled (HOUSEKEEPING_ENABLED=false)");
            return;
        }

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        tracing::info!(
            interval_secs = period.as_secs(),
            expiration_days = self.config.expiration_days,
            "Starting message housekeeping task"
        );

        let mut interval = time::interval(period);
        loop {
            interval.tick().await;

            if let Err(e) = self.cleanup_expired_messages().await {
                tracing::error!(
                    error = %e,
                    error_code = %e.error_code(),
                    "Failed to clean up expired messages"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_log::{InMemoryMessageLog, Message};
    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    async fn seeded_log(expired: usize, fresh: usize) -> Arc<InMemoryMessageLog> {
        let log = Arc::new(InMemoryMessageLog::new());
        let old = Utc::now() - ChronoDuration::days(30);
        for i in 0..(expired + fresh) {
            let mut message =
                Message::new(Uuid::new_v4(), "BP1", "orders", "ORDERS", "application/xml");
            if i < expired {
                message = message.published_at(old);
            }
            log.append(&message).await.unwrap();
        }
        log
    }

    fn config(batch_size: u32, max_batches: u32) -> HousekeepingConfig {
        HousekeepingConfig {
            batch_size,
            max_batches,
            ..HousekeepingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_purges_until_nothing_left() {
        let log = seeded_log(5, 2).await;
        let service = HousekeepingService::new(log.clone(), config(2, 100));

        let report = service.cleanup_expired_messages().await.unwrap();

        assert_eq!(report.batches_deleted, 3);
        assert!(!report.cap_reached);
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_stops_at_batch_cap() {
        let log = seeded_log(10, 0).await;
        let service = HousekeepingService::new(log.clone(), config(2, 2));

        let report = service.cleanup_expired_messages().await.unwrap();

        assert_eq!(report.batches_deleted, 2);
        assert!(report.cap_reached);
        assert_eq!(log.len().await, 6);
    }

    #[tokio::test]
    async fn test_nothing_to_delete() {
        let log = seeded_log(0, 3).await;
        let service = HousekeepingService::new(log.clone(), config(2, 5));

        let report = service.cleanup_expired_messages().await.unwrap();

        assert_eq!(report.batches_deleted, 0);
        assert!(!report.cap_reached);
    }
}
