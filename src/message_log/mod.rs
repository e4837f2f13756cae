//! Ordered log of messages produced by internal applications.
//!
//! Rows are ordered by a store-assigned sequence id. Partners page through
//! their messages with a cursor that is the message id of the last message
//! they received.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExchangeResult;

pub use memory::InMemoryMessageLog;
pub use postgres::PostgresMessageLog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Assigned by the log on insert
    pub sequence_id: Option<i64>,
    pub message_id: Uuid,
    pub bp_id: String,
    pub topic_name: String,
    pub group_id: Option<String>,
    #[serde(rename = "type")]
    pub message_type: String,
    pub date_published: DateTime<Utc>,
    pub partner_topic: Option<String>,
    pub content_type: String,
    pub partner_external_reference: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Message {
    pub fn new(
        message_id: Uuid,
        bp_id: impl Into<String>,
        topic_name: impl Into<String>,
        message_type: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            sequence_id: None,
            message_id,
            bp_id: bp_id.into(),
            topic_name: topic_name.into(),
            group_id: None,
            message_type: message_type.into(),
            date_published: Utc::now(),
            partner_topic: None,
            content_type: content_type.into(),
            partner_external_reference: None,
            metadata: None,
        }
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_partner_topic(mut self, partner_topic: impl Into<String>) -> Self {
        self.partner_topic = Some(partner_topic.into());
        self
    }

    pub fn with_partner_external_reference(mut self, reference: impl Into<String>) -> Self {
        self.partner_external_reference = Some(reference.into());
        self
    }

    /// Empty metadata is stored as absent
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = if metadata.is_empty() { None } else { Some(metadata) };
        self
    }

    pub fn published_at(mut self, date_published: DateTime<Utc>) -> Self {
        self.date_published = date_published;
        self
    }

    /// Object key of the payload in the internal bucket
    pub fn object_key(&self) -> String {
        internal_object_key(&self.bp_id, self.message_id)
    }
}

pub fn internal_object_key(bp_id: &str, message_id: Uuid) -> String {
    format!("{}/{}", bp_id, message_id)
}

/// Optional equality filters; blank values are ignored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    pub topic_name: Option<String>,
    pub group_id: Option<String>,
    pub partner_topic: Option<String>,
    pub partner_external_reference: Option<String>,
}

impl MessageFilter {
    pub fn topic_name(&self) -> Option<&str> {
        has_text(&self.topic_name)
    }

    pub fn group_id(&self) -> Option<&str> {
        has_text(&self.group_id)
    }

    pub fn partner_topic(&self) -> Option<&str> {
        has_text(&self.partner_topic)
    }

    pub fn partner_external_reference(&self) -> Option<&str> {
        has_text(&self.partner_external_reference)
    }

    pub fn matches(&self, message: &Message) -> bool {
        fn eq(filter: Option<&str>, value: Option<&str>) -> bool {
            filter.map_or(true, |f| value == Some(f))
        }
        eq(self.topic_name(), Some(message.topic_name.as_str()))
            && eq(self.group_id(), message.group_id.as_deref())
            && eq(self.partner_topic(), message.partner_topic.as_deref())
            && eq(
                self.partner_external_reference(),
                message.partner_external_reference.as_deref(),
            )
    }
}

fn has_text(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted { sequence_id: i64 },
    /// A row with the same message id already exists
    Duplicate,
}

#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Insert a message. A duplicate message id is not an error.
    async fn append(&self, message: &Message) -> ExchangeResult<AppendOutcome>;

    async fn find_by_message_id(&self, message_id: Uuid) -> ExchangeResult<Option<Message>>;

    async fn find_by_bp_id_and_message_id(
        &self,
        bp_id: &str,
        message_id: Uuid,
    ) -> ExchangeResult<Option<Message>>;

    /// First message after `cursor` for the partner, or the first one
    /// overall when no cursor is given. An unknown cursor yields nothing.
    ///
    /// Takes the same filter as `list`, so a set `group_id` narrows the
    /// cursor walk to one group as well.
    async fn next_after(
        &self,
        cursor: Option<Uuid>,
        bp_id: &str,
        filter: &MessageFilter,
    ) -> ExchangeResult<Option<Message>>;

    /// Up to `limit` messages after `after`, in sequence order. An unknown
    /// cursor lists from the start.
    async fn list(
        &self,
        bp_id: &str,
        filter: &MessageFilter,
        after: Option<Uuid>,
        limit: u32,
    ) -> ExchangeResult<Vec<Message>>;

    /// Delete up to `limit` rows published more than `older_than_days` ago.
    /// Returns whether anything was deleted.
    async fn delete_expired_batch(&self, older_than_days: u32, limit: u32) -> ExchangeResult<bool>;
}
