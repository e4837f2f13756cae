// ============================================================================
// Kafka Configuration
// ============================================================================

use crate::constants::*;

/// Kafka connection and producer settings for the event publisher
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Whether Kafka is enabled (false = events are dropped, useful for local runs)
    pub enabled: bool,
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "SCRAM-SHA-256", "PLAIN")
    pub sasl_mechanism: Option<String>,
    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,
    /// Path to CA certificate file (for self-signed certificates)
    pub ssl_ca_location: Option<String>,
    // producer-specific settings
    pub producer_compression: String, // "zstd" | "snappy" | "gzip" | "lz4" | "none"
    pub producer_acks: String,        // "all" | "1" | "-1" | "0"
    pub producer_linger_ms: u32,
    pub producer_request_timeout_ms: u32,
    pub producer_delivery_timeout_ms: u32,
    pub producer_enable_idempotence: bool,
    /// How long a single send waits for the broker acknowledgement (milliseconds)
    pub send_timeout_ms: u64,
    pub topics: TopicConfig,
}

/// Topic names and publisher identity stamped into every event
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicConfig {
    pub message_received: String,
    pub message_sent: String,
    pub system_name: String,
    pub service_name: String,
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            enabled: std::env::var("KAFKA_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM").ok(),
            sasl_username: std::env::var("KAFKA_SASL_USERNAME").ok(),
            sasl_password: std::env::var("KAFKA_SASL_PASSWORD").ok(),
            ssl_ca_location: std::env::var("KAFKA_SSL_CA_LOCATION").ok(),
            producer_compression: std::env::var("KAFKA_PRODUCER_COMPRESSION")
                .unwrap_or_else(|_| "snappy".to_string()),
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS")
                .unwrap_or_else(|_| "all".to_string()),
            producer_linger_ms: std::env::var("KAFKA_PRODUCER_LINGER_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            producer_request_timeout_ms: std::env::var("KAFKA_PRODUCER_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30000),
            producer_delivery_timeout_ms: std::env::var("KAFKA_PRODUCER_DELIVERY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120000),
            producer_enable_idempotence: std::env::var("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            send_timeout_ms: std::env::var("KAFKA_SEND_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            topics: TopicConfig::from_env(),
        }
    }

    /// Configuration with Kafka switched off, used by tests and local tooling
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            brokers: "localhost:9092".to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            ssl_ca_location: None,
            producer_compression: "snappy".to_string(),
            producer_acks: "all".to_string(),
            producer_linger_ms: 10,
            producer_request_timeout_ms: 30000,
            producer_delivery_timeout_ms: 120000,
            producer_enable_idempotence: true,
            send_timeout_ms: 5000,
            topics: TopicConfig::default(),
        }
    }
}

impl TopicConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            message_received: std::env::var("KAFKA_TOPIC_MESSAGE_RECEIVED")
                .unwrap_or_else(|_| DEFAULT_TOPIC_MESSAGE_RECEIVED.to_string()),
            message_sent: std::env::var("KAFKA_TOPIC_MESSAGE_SENT")
                .unwrap_or_else(|_| DEFAULT_TOPIC_MESSAGE_SENT.to_string()),
            system_name: std::env::var("KAFKA_SYSTEM_NAME")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_NAME.to_string()),
            service_name: std::env::var("KAFKA_SERVICE_NAME")
                .unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string()),
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            message_received: DEFAULT_TOPIC_MESSAGE_RECEIVED.to_string(),
            message_sent: DEFAULT_TOPIC_MESSAGE_SENT.to_string(),
            system_name: DEFAULT_SYSTEM_NAME.to_string(),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
        }
    }
}
