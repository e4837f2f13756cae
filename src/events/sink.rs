use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::types::OutboundEvent;
use crate::error::{ExchangeError, ExchangeResult};

/// Destination for serialized events.
///
/// `send` returns once the event is acknowledged, or fails.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, event: OutboundEvent) -> ExchangeResult<()>;
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<OutboundEvent>>,
    failing_topics: Mutex<HashSet<String>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `topic` fail
    pub fn fail_topic(&self, topic: &str) {
        if let Ok(mut failing) = self.failing_topics.lock() {
            failing.insert(topic.to_string());
        }
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn events_for(&self, topic: &str) -> Vec<OutboundEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.topic == topic)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn send(&self, event: OutboundEvent) -> ExchangeResult<()> {
        let failing = self
            .failing_topics
            .lock()
            .map(|f| f.contains(&event.topic))
            .unwrap_or(false);
        if failing {
            return Err(ExchangeError::Kafka(format!(
                "send to {} rejected",
                event.topic
            )));
        }

        self.events
            .lock()
            .map_err(|_| ExchangeError::illegal_state("event recorder poisoned"))?
            .push(event);
        Ok(())
    }
}
