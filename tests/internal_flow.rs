mod test_utils;

use b2b_exchange::events::MessageSentEvent;
use b2b_exchange::message_log::{Message, MessageFilter, MessageLog};
use b2b_exchange::object_store::MessageContent;
use b2b_exchange::{ExchangeError, ExchangeState};
use exchange_config::{ExchangeConfig, TopicConfig};
use test_utils::*;
use uuid::Uuid;

fn order(bp_id: &str, topic: &str) -> Message {
    Message::new(Uuid::new_v4(), bp_id, topic, "ORDERS", "application/xml")
}

async fn record(exchange: &TestExchange, message: Message) -> Uuid {
    let id = message.message_id;
    let state = exchange
        .context
        .exchange
        .save_new_message_from_internal_application(message, MessageContent::from_bytes(ORDER_XML))
        .await
        .unwrap();
    assert_eq!(state, ExchangeState::Recorded);
    id
}

#[tokio::test]
async fn test_internal_message_is_stored_and_logged() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));
    let id = record(&exchange, order("BP-1", "orders")).await;

    assert_eq!(exchange.backend.object_count(INTERNAL_BUCKET).await, 1);
    assert_eq!(exchange.message_log.len().await, 1);

    let fetched = exchange
        .context
        .exchange
        .get_message_from_internal_application("BP-1", id, Some("application/xml"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.message.message_id, id);
    assert_eq!(fetched.payload.as_ref(), ORDER_XML.as_bytes());
    assert_eq!(fetched.content_type, "application/xml");

    // Another partner cannot see it
    let foreign = exchange
        .context
        .exchange
        .get_message_from_internal_application("BP-2", id, None)
        .await
        .unwrap();
    assert!(foreign.is_none());
}

#[tokio::test]
async fn test_content_type_mismatch() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));
    let id = record(&exchange, order("BP-1", "orders")).await;
    let service = &exchange.context.exchange;

    let err = service
        .get_message_from_internal_application("BP-1", id, Some("text/xml"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::MismatchedContentType { .. }));
    assert_eq!(
        err.to_string(),
        format!(
            "Message {} has content type application/xml but requested content type is text/xml",
            id
        )
    );

    let any = service
        .get_message_from_internal_application("BP-1", id, Some("*/*"))
        .await
        .unwrap();
    assert!(any.is_some());
}

#[tokio::test]
async fn test_partner_pages_through_messages_with_cursor() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));
    let first = record(&exchange, order("BP-1", "orders")).await;
    record(&exchange, order("BP-2", "orders")).await;
    let second = record(&exchange, order("BP-1", "invoices")).await;
    let third = record(&exchange, order("BP-1", "orders")).await;
    let service = &exchange.context.exchange;
    let all = MessageFilter::default();

    let mut seen = Vec::new();
    let mut cursor = None;
    while let Some(next) = service
        .get_next_message_from_internal_application(cursor, "BP-1", &all)
        .await
        .unwrap()
    {
        seen.push(next.message.message_id);
        cursor = Some(next.message.message_id);
    }
    assert_eq!(seen, vec![first, second, third]);

    let orders_only = MessageFilter {
        topic_name: Some("orders".to_string()),
        ..MessageFilter::default()
    };
    let next = service
        .get_next_message_from_internal_application(Some(first), "BP-1", &orders_only)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.message.message_id, third);

    let page = service
        .get_messages("BP-1", &all, Some(first), 1)
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].message_id, second);
}

#[tokio::test]
async fn test_retried_save_is_idempotent() {
    let exchange = spawn_exchange(test_config(ExchangeConfig {
        message_sent_event_enabled: true,
        ..ExchangeConfig::default()
    }));
    let message = order("BP-1", "orders").with_group_id("batch-9");

    record(&exchange, message.clone()).await;
    record(&exchange, message.clone()).await;

    assert_eq!(exchange.message_log.len().await, 1);
    let sent = exchange.sink.events_for(&TopicConfig::default().message_sent);
    assert_eq!(sent.len(), 2);
    let event: MessageSentEvent = serde_json::from_slice(&sent[0].payload).unwrap();
    assert_eq!(event.message_id, message.message_id);
    assert_eq!(event.group_id.as_deref(), Some("batch-9"));
}

#[tokio::test]
async fn test_sent_event_disabled_by_default() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));
    record(&exchange, order("BP-1", "orders")).await;
    assert!(exchange.sink.events().is_empty());
}

#[tokio::test]
async fn test_invalid_internal_payload_is_not_logged() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));

    let err = exchange
        .context
        .exchange
        .save_new_message_from_internal_application(
            order("BP-1", "orders"),
            MessageContent::from_bytes("<order>&nbsp;</order>"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::MalformedXml { .. }));
    assert_eq!(exchange.backend.object_count(INTERNAL_BUCKET).await, 0);
    assert!(exchange.message_log.is_empty().await);
}

#[tokio::test]
async fn test_log_row_without_payload_reads_as_missing() {
    let exchange = spawn_exchange(test_config(ExchangeConfig::default()));
    let message = order("BP-1", "orders");
    exchange.message_log.append(&message).await.unwrap();

    let fetched = exchange
        .context
        .exchange
        .get_message_from_internal_application("BP-1", message.message_id, None)
        .await
        .unwrap();
    assert!(fetched.is_none());
}
