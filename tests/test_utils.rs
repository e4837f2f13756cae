#![allow(dead_code)]

use std::sync::Arc;

use b2b_exchange::events::RecordingEventSink;
use b2b_exchange::message_log::InMemoryMessageLog;
use b2b_exchange::metrics::RecordingScanMetrics;
use b2b_exchange::object_store::InMemoryBlobBackend;
use b2b_exchange::scan::BucketEventScanTrigger;
use b2b_exchange::{ExchangeContext, StorageBackends};
use exchange_config::{
    BucketNames, Config, DbConfig, ExchangeConfig, FallbackStorageConfig, HousekeepingConfig,
    KafkaConfig, ObjectStorageConfig, StorageConnection,
};

pub const INTERNAL_BUCKET: &str = "test-internal";
pub const PARTNER_BUCKET: &str = "test-partner";
pub const FALLBACK_INTERNAL_BUCKET: &str = "old-internal";
pub const FALLBACK_PARTNER_BUCKET: &str = "old-partner";

pub const ORDER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<order id="4711">
  <line sku="A-1" qty="2"/>
  <note><![CDATA[fragile & heavy]]></note>
</order>
"#;

pub struct TestExchange {
    pub context: ExchangeContext,
    pub backend: Arc<InMemoryBlobBackend>,
    /// Separate store holding the fallback buckets
    pub fallback_backend: Arc<InMemoryBlobBackend>,
    pub message_log: Arc<InMemoryMessageLog>,
    pub sink: Arc<RecordingEventSink>,
    pub scan_metrics: Arc<RecordingScanMetrics>,
}

pub fn test_config(exchange: ExchangeConfig) -> Config {
    Config {
        database_url: "postgres://localhost/unused".to_string(),
        rust_log: "debug".to_string(),
        db: DbConfig::default(),
        kafka: KafkaConfig::disabled(),
        object_storage: ObjectStorageConfig {
            connection: StorageConnection::default(),
            buckets: BucketNames {
                internal: INTERNAL_BUCKET.to_string(),
                partner: PARTNER_BUCKET.to_string(),
            },
            fallback: None,
            lifecycle_policy_name: "test-housekeeping".to_string(),
        },
        housekeeping: HousekeepingConfig::default(),
        exchange,
    }
}

pub fn spawn_exchange(config: Config) -> TestExchange {
    let backend = Arc::new(InMemoryBlobBackend::with_buckets(&[INTERNAL_BUCKET, PARTNER_BUCKET]));
    let fallback_backend = Arc::new(InMemoryBlobBackend::with_buckets(&[
        FALLBACK_INTERNAL_BUCKET,
        FALLBACK_PARTNER_BUCKET,
    ]));
    let message_log = Arc::new(InMemoryMessageLog::new());
    let sink = Arc::new(RecordingEventSink::new());
    let scan_metrics = Arc::new(RecordingScanMetrics::new());

    let context = ExchangeContext::build_with(
        config,
        StorageBackends::new(backend.clone()).with_fallback(fallback_backend.clone()),
        message_log.clone(),
        sink.clone(),
        scan_metrics.clone(),
        Arc::new(BucketEventScanTrigger),
    );

    TestExchange {
        context,
        backend,
        fallback_backend,
        message_log,
        sink,
        scan_metrics,
    }
}

pub fn with_fallback(mut config: Config) -> Config {
    config.object_storage.fallback = Some(FallbackStorageConfig {
        connection: StorageConnection {
            endpoint: Some("http://old-store.local".to_string()),
            ..StorageConnection::default()
        },
        buckets: BucketNames {
            internal: FALLBACK_INTERNAL_BUCKET.to_string(),
            partner: FALLBACK_PARTNER_BUCKET.to_string(),
        },
    });
    config
}

pub fn scanning_enabled() -> ExchangeConfig {
    ExchangeConfig {
        malware_scan_enabled: true,
        ..ExchangeConfig::default()
    }
}
