use std::sync::Arc;

use exchange_config::Config;

use crate::error::ExchangeResult;
use crate::events::{EventPublisher, EventSink};
use crate::exchange::MessageExchangeService;
use crate::housekeeping::HousekeepingService;
use crate::message_log::MessageLog;
use crate::metrics::{PrometheusScanMetrics, ScanMetrics};
use crate::object_store::{
    BlobBackend, BucketStore, FallbackObjectStore, LifecyclePolicy, LifecyclePolicyInstaller,
    ObjectStore, ReadOnlyBuckets,
};
use crate::scan::{BucketEventScanTrigger, ScanTrigger};

/// Physical stores behind the object store
#[derive(Clone)]
pub struct StorageBackends {
    pub primary: Arc<dyn BlobBackend>,
    /// Separately configured store serving reads that miss the primary
    pub fallback: Option<Arc<dyn BlobBackend>>,
}

impl StorageBackends {
    pub fn new(primary: Arc<dyn BlobBackend>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn BlobBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Shared dependencies of the exchange, wired once at startup
#[derive(Clone)]
pub struct ExchangeContext {
    pub config: Arc<Config>,
    pub object_store: Arc<dyn ObjectStore>,
    pub message_log: Arc<dyn MessageLog>,
    pub events: Arc<EventPublisher>,
    pub exchange: Arc<MessageExchangeService>,
}

impl ExchangeContext {
    /// Wire the exchange with the Prometheus scan metrics and the
    /// bucket-event scan trigger.
    pub fn build(
        config: Config,
        backends: StorageBackends,
        message_log: Arc<dyn MessageLog>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self::build_with(
            config,
            backends,
            message_log,
            sink,
            Arc::new(PrometheusScanMetrics),
            Arc::new(BucketEventScanTrigger),
        )
    }

    pub fn build_with(
        config: Config,
        backends: StorageBackends,
        message_log: Arc<dyn MessageLog>,
        sink: Arc<dyn EventSink>,
        scan_metrics: Arc<dyn ScanMetrics>,
        scan_trigger: Arc<dyn ScanTrigger>,
    ) -> Self {
        let storage = &config.object_storage;
        // Objects outlive their log rows by a day so a listed row always has a payload.
        let policy = LifecyclePolicy::new(
            storage.lifecycle_policy_name.clone(),
            config.housekeeping.expiration_days.saturating_add(1),
        );
        let installer = Arc::new(LifecyclePolicyInstaller::new(
            policy,
            backends.primary.clone(),
        ));

        let primary = BucketStore::new(
            backends.primary,
            storage.buckets.clone(),
            installer,
            config.housekeeping.enabled,
        );
        let object_store: Arc<dyn ObjectStore> = match (&storage.fallback, backends.fallback) {
            (Some(fallback), Some(backend)) => {
                tracing::info!(
                    internal = %fallback.buckets.internal,
                    partner = %fallback.buckets.partner,
                    endpoint = fallback.connection.endpoint.as_deref().unwrap_or("default"),
                    region = %fallback.connection.region,
                    "Reading through to fallback store"
                );
                Arc::new(FallbackObjectStore::new(
                    primary,
                    ReadOnlyBuckets::new(backend, fallback.buckets.clone()),
                ))
            }
            (Some(_), None) => {
                tracing::warn!(
                    "Fallback buckets are configured but no fallback store was provided, fallback reads are disabled"
                );
                Arc::new(primary)
            }
            (None, _) => Arc::new(primary),
        };

        let events = Arc::new(EventPublisher::new(
            sink,
            config.kafka.topics.clone(),
            config.exchange.message_sent_event_enabled,
        ));

        let exchange = Arc::new(MessageExchangeService::new(
            object_store.clone(),
            message_log.clone(),
            events.clone(),
            scan_metrics,
            scan_trigger,
            config.exchange.clone(),
        ));

        Self {
            config: Arc::new(config),
            object_store,
            message_log,
            events,
            exchange,
        }
    }

    /// Fail fast when a bucket is unreachable; installs the lifecycle rule
    /// when housekeeping is enabled.
    pub async fn verify_storage(&self) -> ExchangeResult<()> {
        self.object_store.verify_bucket_access().await
    }

    pub fn housekeeping(&self) -> HousekeepingService {
        HousekeepingService::new(self.message_log.clone(), self.config.housekeeping.clone())
    }
}
