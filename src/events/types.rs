use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::object_store::tags::ScanStatus;

/// A serialized event ready for the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEvent {
    pub topic: String,
    /// Partition key
    pub key: String,
    pub payload: Vec<u8>,
}

/// Identity and origin shared by every event this service emits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHeader {
    pub event_id: Uuid,
    /// Consumers deduplicate on this; it equals the message id
    pub idempotence_id: Uuid,
    pub created: DateTime<Utc>,
    pub system_name: String,
    pub service_name: String,
}

/// A message became available for internal consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReceivedEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub message_id: Uuid,
    pub bp_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub variant: String,
    pub scan_status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_type: Option<String>,
}

/// An internal message was recorded for partner pickup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSentEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub message_id: Uuid,
    pub bp_id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub content_type: String,
    pub topic_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub partner_topic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_received_event_json_shape() {
        let id = Uuid::new_v4();
        let event = MessageReceivedEvent {
            header: EventHeader {
                event_id: Uuid::new_v4(),
                idempotence_id: id,
                created: Utc::now(),
                system_name: "b2b".to_string(),
                service_name: "mes".to_string(),
            },
            message_id: id,
            bp_id: "BP1".to_string(),
            message_type: "ORDERS".to_string(),
            variant: "ORDERS".to_string(),
            scan_status: ScanStatus::NotScanned,
            content_type: None,
        };

        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ORDERS");
        assert_eq!(json["scanStatus"], "NOT_SCANNED");
        assert_eq!(json["idempotenceId"], id.to_string());
        assert!(json.get("contentType").is_none());

        let back: MessageReceivedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
