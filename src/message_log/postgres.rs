use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{AppendOutcome, Message, MessageFilter, MessageLog};
use crate::error::ExchangeResult;

const SELECT_MESSAGE: &str = r#"
    SELECT sequence_id, message_id, bp_id, topic_name, group_id, message_type,
           date_published, partner_topic, content_type, partner_external_reference, metadata
    FROM b2b_message
    WHERE bp_id = "#;

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    sequence_id: i64,
    message_id: Uuid,
    bp_id: String,
    topic_name: String,
    group_id: Option<String>,
    message_type: String,
    date_published: DateTime<Utc>,
    partner_topic: Option<String>,
    content_type: String,
    partner_external_reference: Option<String>,
    metadata: Option<Json<HashMap<String, String>>>,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            sequence_id: Some(row.sequence_id),
            message_id: row.message_id,
            bp_id: row.bp_id,
            topic_name: row.topic_name,
            group_id: row.group_id,
            message_type: row.message_type,
            date_published: row.date_published,
            partner_topic: row.partner_topic,
            content_type: row.content_type,
            partner_external_reference: row.partner_external_reference,
            metadata: row.metadata.map(|m| m.0).filter(|m| !m.is_empty()),
        }
    }
}

/// PostgreSQL implementation of MessageLog
pub struct PostgresMessageLog {
    pool: PgPool,
}

impl PostgresMessageLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn sequence_of(&self, bp_id: &str, message_id: Uuid) -> ExchangeResult<Option<i64>> {
        let sequence_id = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT sequence_id
            FROM b2b_message
            WHERE bp_id = $1 AND message_id = $2
            "#,
        )
        .bind(bp_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sequence_id)
    }

    fn select_after<'a>(
        bp_id: &str,
        filter: &MessageFilter,
        after_sequence: Option<i64>,
        limit: i64,
    ) -> QueryBuilder<'a, Postgres> {
        let mut query = QueryBuilder::new(SELECT_MESSAGE);
        query.push_bind(bp_id.to_string());

        if let Some(sequence_id) = after_sequence {
            query.push(" AND sequence_id > ").push_bind(sequence_id);
        }
        if let Some(topic_name) = filter.topic_name() {
            query.push(" AND topic_name = ").push_bind(topic_name.to_string());
        }
        if let Some(group_id) = filter.group_id() {
            query.push(" AND group_id = ").push_bind(group_id.to_string());
        }
        if let Some(partner_topic) = filter.partner_topic() {
            query
                .push(" AND partner_topic = ")
                .push_bind(partner_topic.to_string());
        }
        if let Some(reference) = filter.partner_external_reference() {
            query
                .push(" AND partner_external_reference = ")
                .push_bind(reference.to_string());
        }

        query.push(" ORDER BY sequence_id LIMIT ").push_bind(limit);
        query
    }
}

#[async_trait]
impl MessageLog for PostgresMessageLog {
    async fn append(&self, message: &Message) -> ExchangeResult<AppendOutcome> {
        let sequence_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO b2b_message (
                message_id, bp_id, topic_name, group_id, message_type, date_published,
                partner_topic, content_type, partner_external_reference, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (message_id) DO NOTHING
            RETURNING sequence_id
            "#,
        )
        .bind(message.message_id)
        .bind(&message.bp_id)
        .bind(&message.topic_name)
        .bind(&message.group_id)
        .bind(&message.message_type)
        .bind(message.date_published)
        .bind(&message.partner_topic)
        .bind(&message.content_type)
        .bind(&message.partner_external_reference)
        .bind(
            message
                .metadata
                .as_ref()
                .filter(|m| !m.is_empty())
                .map(Json),
        )
        .fetch_optional(&self.pool)
        .await?;

        match sequence_id {
            Some(sequence_id) => Ok(AppendOutcome::Inserted { sequence_id }),
            None => {
                tracing::warn!(
                    message_id = %message.message_id,
                    bp_id = %message.bp_id,
                    "Message already present in the message log, skipping"
                );
                Ok(AppendOutcome::Duplicate)
            }
        }
    }

    async fn find_by_message_id(&self, message_id: Uuid) -> ExchangeResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT sequence_id, message_id, bp_id, topic_name, group_id, message_type,
                   date_published, partner_topic, content_type, partner_external_reference, metadata
            FROM b2b_message
            WHERE message_id = $1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Message::from))
    }

    async fn find_by_bp_id_and_message_id(
        &self,
        bp_id: &str,
        message_id: Uuid,
    ) -> ExchangeResult<Option<Message>> {
        let mut query = QueryBuilder::<Postgres>::new(SELECT_MESSAGE);
        query.push_bind(bp_id.to_string());
        query.push(" AND message_id = ").push_bind(message_id);

        let row = query
            .build_query_as::<MessageRow>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Message::from))
    }

    async fn next_after(
        &self,
        cursor: Option<Uuid>,
        bp_id: &str,
        filter: &MessageFilter,
    ) -> ExchangeResult<Option<Message>> {
        let after_sequence = match cursor {
            Some(cursor) => match self.sequence_of(bp_id, cursor).await? {
                Some(sequence_id) => Some(sequence_id),
                None => {
                    tracing::debug!(bp_id = %bp_id, cursor = %cursor, "Unknown cursor");
                    return Ok(None);
                }
            },
            None => None,
        };

        let row = Self::select_after(bp_id, filter, after_sequence, 1)
            .build_query_as::<MessageRow>()
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Message::from))
    }

    async fn list(
        &self,
        bp_id: &str,
        filter: &MessageFilter,
        after: Option<Uuid>,
        limit: u32,
    ) -> ExchangeResult<Vec<Message>> {
        let after_sequence = match after {
            Some(cursor) => self.sequence_of(bp_id, cursor).await?,
            None => None,
        };

        let rows = Self::select_after(bp_id, filter, after_sequence, i64::from(limit))
            .build_query_as::<MessageRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Message::from).collect())
    }

    async fn delete_expired_batch(&self, older_than_days: u32, limit: u32) -> ExchangeResult<bool> {
        let result = sqlx::query(
            r#"
            WITH expired AS (
                SELECT sequence_id
                FROM b2b_message
                WHERE date_published < NOW() - make_interval(days => $1)
                LIMIT $2
            )
            DELETE FROM b2b_message
            WHERE sequence_id IN (SELECT sequence_id FROM expired)
            "#,
        )
        .bind(older_than_days as i32)
        .bind(i64::from(limit))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn log() -> PostgresMessageLog {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        PostgresMessageLog::new(pool)
    }

    fn message(bp_id: &str) -> Message {
        Message::new(Uuid::new_v4(), bp_id, "orders", "ORDERS", "application/xml")
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_append_and_find() {
        let log = log().await;
        let m = message("BP-PG-1")
            .with_metadata(HashMap::from([("k".to_string(), "v".to_string())]));

        assert!(matches!(
            log.append(&m).await.unwrap(),
            AppendOutcome::Inserted { .. }
        ));
        assert_eq!(log.append(&m).await.unwrap(), AppendOutcome::Duplicate);

        let found = log.find_by_message_id(m.message_id).await.unwrap().unwrap();
        assert_eq!(found.metadata, m.metadata);
        assert!(log
            .find_by_bp_id_and_message_id("other", m.message_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_cursor_chain() {
        let log = log().await;
        let bp_id = format!("BP-{}", Uuid::new_v4());
        let mut expected = Vec::new();
        for _ in 0..3 {
            let m = message(&bp_id);
            log.append(&m).await.unwrap();
            expected.push(m.message_id);
        }

        let mut visited = Vec::new();
        let mut cursor = None;
        while let Some(next) = log
            .next_after(cursor, &bp_id, &MessageFilter::default())
            .await
            .unwrap()
        {
            visited.push(next.message_id);
            cursor = Some(next.message_id);
        }
        assert_eq!(visited, expected);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_delete_expired_batch() {
        let log = log().await;
        let bp_id = format!("BP-{}", Uuid::new_v4());
        let old = message(&bp_id).published_at(Utc::now() - Duration::days(400));
        log.append(&old).await.unwrap();

        while log.delete_expired_batch(365, 100).await.unwrap() {}
        assert!(log.find_by_message_id(old.message_id).await.unwrap().is_none());
    }
}
