//! Domain events published when messages enter or leave the exchange.

pub mod kafka;
pub mod publisher;
pub mod sink;
pub mod types;

pub use kafka::KafkaEventSink;
pub use publisher::{EventPublisher, MessageReceivedListener};
pub use sink::{EventSink, RecordingEventSink};
pub use types::{MessageReceivedEvent, MessageSentEvent, OutboundEvent};
