use std::sync::Arc;

use chrono::Utc;
use exchange_config::TopicConfig;
use futures_util::future::try_join_all;
use uuid::Uuid;

use super::sink::EventSink;
use super::types::{EventHeader, MessageReceivedEvent, MessageSentEvent, OutboundEvent};
use crate::error::ExchangeResult;
use crate::message_log::Message;
use crate::object_store::tags::ScanStatus;

/// Extra consumer of "message received", contributing its own event.
pub trait MessageReceivedListener: Send + Sync {
    fn on_message_received(
        &self,
        message_id: Uuid,
        bp_id: &str,
        message_type: &str,
    ) -> ExchangeResult<OutboundEvent>;
}

/// Builds domain events and hands them to the sink.
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    listeners: Vec<Arc<dyn MessageReceivedListener>>,
    topics: TopicConfig,
    message_sent_enabled: bool,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EventSink>, topics: TopicConfig, message_sent_enabled: bool) -> Self {
        Self {
            sink,
            listeners: Vec::new(),
            topics,
            message_sent_enabled,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn MessageReceivedListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn topics(&self) -> &TopicConfig {
        &self.topics
    }

    fn header(&self, message_id: Uuid) -> EventHeader {
        EventHeader {
            event_id: Uuid::new_v4(),
            idempotence_id: message_id,
            created: Utc::now(),
            system_name: self.topics.system_name.clone(),
            service_name: self.topics.service_name.clone(),
        }
    }

    /// Publish "message received" plus one event per listener.
    ///
    /// Returns once every send was acknowledged, or with the first failure.
    pub async fn publish_received(
        &self,
        message_id: Uuid,
        bp_id: &str,
        message_type: &str,
        scan_status: ScanStatus,
        content_type: Option<&str>,
    ) -> ExchangeResult<()> {
        let event = MessageReceivedEvent {
            header: self.header(message_id),
            message_id,
            bp_id: bp_id.to_string(),
            message_type: message_type.to_string(),
            variant: message_type.to_string(),
            scan_status,
            content_type: content_type.map(str::to_string),
        };

        let mut outbound = vec![OutboundEvent {
            topic: self.topics.message_received.clone(),
            key: message_id.to_string(),
            payload: serde_json::to_vec(&event)?,
        }];
        for listener in &self.listeners {
            outbound.push(listener.on_message_received(message_id, bp_id, message_type)?);
        }

        let count = outbound.len();
        try_join_all(outbound.into_iter().map(|e| self.sink.send(e))).await?;

        tracing::info!(
            message_id = %message_id,
            bp_id = %bp_id,
            message_type = %message_type,
            scan_status = %scan_status,
            event_count = count,
            "Published message received event"
        );
        Ok(())
    }

    /// Publish "message sent" when enabled; otherwise a no-op.
    pub async fn publish_sent(&self, message: &Message) -> ExchangeResult<()> {
        if !self.message_sent_enabled {
            return Ok(());
        }

        let event = MessageSentEvent {
            header: self.header(message.message_id),
            message_id: message.message_id,
            bp_id: message.bp_id.clone(),
            message_type: message.message_type.clone(),
            content_type: message.content_type.clone(),
            topic_name: message.topic_name.clone(),
            group_id: message.group_id.clone(),
            partner_topic: message.partner_topic.clone(),
        };

        self.sink
            .send(OutboundEvent {
                topic: self.topics.message_sent.clone(),
                key: message.message_id.to_string(),
                payload: serde_json::to_vec(&event)?,
            })
            .await?;

        tracing::debug!(
            message_id = %message.message_id,
            bp_id = %message.bp_id,
            "Published message sent event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::sink::RecordingEventSink;

    struct AuditListener;

    impl MessageReceivedListener for AuditListener {
        fn on_message_received(
            &self,
            message_id: Uuid,
            bp_id: &str,
            _message_type: &str,
        ) -> ExchangeResult<OutboundEvent> {
            Ok(OutboundEvent {
                topic: "audit".to_string(),
                key: message_id.to_string(),
                payload: bp_id.as_bytes().to_vec(),
            })
        }
    }

    #[tokio::test]
    async fn test_received_event_and_listeners() {
        let sink = Arc::new(RecordingEventSink::new());
        let publisher = EventPublisher::new(sink.clone(), TopicConfig::default(), false)
            .with_listener(Arc::new(AuditListener));
        let id = Uuid::new_v4();

        publisher
            .publish_received(id, "BP1", "ORDERS", ScanStatus::NotScanned, Some("application/xml"))
            .await
            .unwrap();

        let received = sink.events_for(&TopicConfig::default().message_received);
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].key, id.to_string());
        let event: MessageReceivedEvent = serde_json::from_slice(&received[0].payload).unwrap();
        assert_eq!(event.scan_status, ScanStatus::NotScanned);
        assert_eq!(event.header.idempotence_id, id);
        assert_eq!(event.variant, "ORDERS");

        assert_eq!(sink.events_for("audit").len(), 1);
    }

    #[tokio::test]
    async fn test_listener_failure_surfaces() {
        let sink = Arc::new(RecordingEventSink::new());
        sink.fail_topic("audit");
        let publisher = EventPublisher::new(sink.clone(), TopicConfig::default(), false)
            .with_listener(Arc::new(AuditListener));

        let result = publisher
            .publish_received(Uuid::new_v4(), "BP1", "ORDERS", ScanStatus::NoThreatsFound, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sent_event_respects_switch() {
        let sink = Arc::new(RecordingEventSink::new());
        let message = Message::new(Uuid::new_v4(), "BP1", "orders", "ORDERS", "application/xml");

        EventPublisher::new(sink.clone(), TopicConfig::default(), false)
            .publish_sent(&message)
            .await
            .unwrap();
        assert!(sink.events().is_empty());

        EventPublisher::new(sink.clone(), TopicConfig::default(), true)
            .publish_sent(&message)
            .await
            .unwrap();
        let sent = sink.events_for(&TopicConfig::default().message_sent);
        assert_eq!(sent.len(), 1);
        let event: MessageSentEvent = serde_json::from_slice(&sent[0].payload).unwrap();
        assert_eq!(event.topic_name, "orders");
    }
}
