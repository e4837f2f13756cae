use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use exchange_config::KafkaConfig;
use exchange_metrics::{KAFKA_PRODUCE_FAILURE, KAFKA_PRODUCE_LATENCY, KAFKA_PRODUCE_SUCCESS};
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, error, info};

use super::sink::EventSink;
use super::types::OutboundEvent;
use crate::error::{ExchangeError, ExchangeResult};

/// Creates a `ClientConfig` with brokers, SSL and SASL settings applied.
pub fn create_client_config(config: &KafkaConfig) -> Result<ClientConfig> {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);

    if !config.enabled {
        // Placeholder client that is never used to send.
        return Ok(client_config);
    }

    client_config.set("security.protocol", "plaintext");

    if config.ssl_enabled {
        info!("Enabling SSL/TLS for Kafka connection");
        client_config.set("security.protocol", "ssl");
        if let Some(ca_location) = &config.ssl_ca_location {
            client_config.set("ssl.ca.location", ca_location);
        }
    }

    if let (Some(mechanism), Some(username), Some(password)) = (
        &config.sasl_mechanism,
        &config.sasl_username,
        &config.sasl_password,
    ) {
        info!(sasl_mechanism = %mechanism, "Configuring SASL authentication");
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);

        if config.ssl_enabled {
            client_config.set("security.protocol", "sasl_ssl");
        } else {
            client_config.set("security.protocol", "sasl_plaintext");
        }
    }

    Ok(client_config)
}

/// Kafka-backed event sink.
///
/// Configured for at-least-once delivery with idempotent writes; each send
/// waits for the broker acknowledgement.
pub struct KafkaEventSink {
    producer: Arc<FutureProducer>,
    send_timeout: Duration,
    enabled: bool,
}

impl KafkaEventSink {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        if !config.enabled {
            info!("Kafka event sink disabled (KAFKA_ENABLED=false)");
            let producer = create_client_config(config)?
                .create()
                .context("Failed to create disabled Kafka producer")?;

            return Ok(Self {
                producer: Arc::new(producer),
                send_timeout: Duration::from_millis(config.send_timeout_ms),
                enabled: false,
            });
        }

        info!("Initializing Kafka producer...");
        let producer: FutureProducer = create_client_config(config)?
            .set("acks", &config.producer_acks)
            .set(
                "enable.idempotence",
                config.producer_enable_idempotence.to_string(),
            )
            .set("max.in.flight.requests.per.connection", "5")
            .set("compression.type", &config.producer_compression)
            .set("linger.ms", config.producer_linger_ms.to_string())
            .set(
                "request.timeout.ms",
                config.producer_request_timeout_ms.to_string(),
            )
            .set(
                "delivery.timeout.ms",
                config.producer_delivery_timeout_ms.to_string(),
            )
            .create()
            .context("Failed to create Kafka producer")?;

        info!(brokers = %config.brokers, "Kafka producer initialized");

        Ok(Self {
            producer: Arc::new(producer),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            enabled: true,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flush pending messages (for graceful shutdown)
    pub fn flush(&self, timeout: Duration) -> ExchangeResult<()> {
        if !self.enabled {
            return Ok(());
        }
        info!("Flushing Kafka producer (timeout: {:?})", timeout);
        self.producer.flush(Timeout::After(timeout))?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for KafkaEventSink {
    async fn send(&self, event: OutboundEvent) -> ExchangeResult<()> {
        if !self.enabled {
            debug!(topic = %event.topic, key = %event.key, "Kafka disabled, dropping event");
            return Ok(());
        }

        let record = FutureRecord::to(&event.topic)
            .key(event.key.as_bytes())
            .payload(&event.payload);

        let start = std::time::Instant::now();
        match self
            .producer
            .send(record, Timeout::After(self.send_timeout))
            .await
        {
            Ok((partition, offset)) => {
                let latency = start.elapsed();
                KAFKA_PRODUCE_SUCCESS.inc();
                KAFKA_PRODUCE_LATENCY.observe(latency.as_secs_f64());

                debug!(
                    topic = %event.topic,
                    key = %event.key,
                    partition = partition,
                    offset = offset,
                    latency_ms = latency.as_millis(),
                    "Event published"
                );
                Ok(())
            }
            Err((kafka_err, _)) => {
                KAFKA_PRODUCE_FAILURE.inc();

                error!(
                    error = %kafka_err,
                    topic = %event.topic,
                    key = %event.key,
                    latency_ms = start.elapsed().as_millis(),
                    "Failed to publish event"
                );
                Err(ExchangeError::Kafka(format!(
                    "send to {} failed: {}",
                    event.topic, kafka_err
                )))
            }
        }
    }
}

impl Clone for KafkaEventSink {
    fn clone(&self) -> Self {
        Self {
            producer: Arc::clone(&self.producer),
            send_timeout: self.send_timeout,
            enabled: self.enabled,
        }
    }
}
