use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AppendOutcome, Message, MessageFilter, MessageLog};
use crate::error::ExchangeResult;

#[derive(Debug, Default)]
struct LogState {
    /// Kept in ascending sequence order
    rows: Vec<Message>,
    next_sequence: i64,
}

impl LogState {
    fn sequence_of(&self, bp_id: &str, message_id: Uuid) -> Option<i64> {
        self.rows
            .iter()
            .find(|m| m.message_id == message_id && m.bp_id == bp_id)
            .and_then(|m| m.sequence_id)
    }

    fn after<'a>(
        &'a self,
        bp_id: &'a str,
        filter: &'a MessageFilter,
        after_sequence: Option<i64>,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        self.rows.iter().filter(move |m| {
            m.bp_id == bp_id
                && after_sequence.map_or(true, |seq| m.sequence_id.unwrap_or(0) > seq)
                && filter.matches(m)
        })
    }
}

/// Message log kept in process memory, for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryMessageLog {
    state: RwLock<LogState>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn append(&self, message: &Message) -> ExchangeResult<AppendOutcome> {
        let mut state = self.state.write().await;
        if state.rows.iter().any(|m| m.message_id == message.message_id) {
            tracing::warn!(
                message_id = %message.message_id,
                "Message already present, skipping"
            );
            return Ok(AppendOutcome::Duplicate);
        }

        state.next_sequence += 1;
        let sequence_id = state.next_sequence;
        let mut row = message.clone();
        row.sequence_id = Some(sequence_id);
        state.rows.push(row);
        Ok(AppendOutcome::Inserted { sequence_id })
    }

    async fn find_by_message_id(&self, message_id: Uuid) -> ExchangeResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state.rows.iter().find(|m| m.message_id == message_id).cloned())
    }

    async fn find_by_bp_id_and_message_id(
        &self,
        bp_id: &str,
        message_id: Uuid,
    ) -> ExchangeResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state
            .rows
            .iter()
            .find(|m| m.message_id == message_id && m.bp_id == bp_id)
            .cloned())
    }

    async fn next_after(
        &self,
        cursor: Option<Uuid>,
        bp_id: &str,
        filter: &MessageFilter,
    ) -> ExchangeResult<Option<Message>> {
        let state = self.state.read().await;
        let after_sequence = match cursor {
            Some(cursor) => match state.sequence_of(bp_id, cursor) {
                Some(seq) => Some(seq),
                None => return Ok(None),
            },
            None => None,
        };
        let next = state.after(bp_id, filter, after_sequence).next().cloned();
        Ok(next)
    }

    async fn list(
        &self,
        bp_id: &str,
        filter: &MessageFilter,
        after: Option<Uuid>,
        limit: u32,
    ) -> ExchangeResult<Vec<Message>> {
        let state = self.state.read().await;
        let after_sequence = after.and_then(|cursor| state.sequence_of(bp_id, cursor));
        Ok(state
            .after(bp_id, filter, after_sequence)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete_expired_batch(&self, older_than_days: u32, limit: u32) -> ExchangeResult<bool> {
        let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
        let mut state = self.state.write().await;

        let mut remaining = limit as usize;
        let before = state.rows.len();
        state.rows.retain(|m| {
            if remaining > 0 && m.date_published < cutoff {
                remaining -= 1;
                false
            } else {
                true
            }
        });
        Ok(state.rows.len() < before)
    }
}
