//! Ingestion and retrieval flows of the message exchange.
//!
//! Partner uploads go to the partner bucket with scan-status tags and are
//! published either immediately (scanning off) or once the scanner reports
//! a verdict. Internal messages go to the internal bucket and are appended
//! to the message log, where partners page through them.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use exchange_config::ExchangeConfig;
use futures_util::{stream, StreamExt};
use uuid::Uuid;

use crate::error::{ExchangeError, ExchangeResult};
use crate::events::EventPublisher;
use crate::message_log::{internal_object_key, AppendOutcome, Message, MessageFilter, MessageLog};
use crate::metrics::ScanMetrics;
use crate::object_store::tags::{self, ScanStatus, ScanStatusTags};
use crate::object_store::{BucketType, LoadedMessage, MessageContent, ObjectStore};
use crate::scan::{ScanResult, ScanResultNotification, ScanTrigger};
use crate::xml::{XmlValidatingStream, XmlValidator};

const ANY_CONTENT_TYPE: &str = "*/*";

/// Where a message stands after an ingestion call returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Stored, waiting for the malware verdict
    StoredAwaitingScan,
    /// Stored and announced to consumers
    Published,
    /// Stored and recorded in the message log
    Recorded,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::StoredAwaitingScan => f.write_str("STORED_AWAITING_SCAN"),
            ExchangeState::Published => f.write_str("PUBLISHED"),
            ExchangeState::Recorded => f.write_str("RECORDED"),
        }
    }
}

/// Upload from a business partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerSubmission {
    pub message_id: Uuid,
    pub bp_id: String,
    pub message_type: String,
    pub content_type: String,
    pub partner_topic: Option<String>,
    pub partner_external_reference: Option<String>,
}

/// Internal message handed out to a partner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalMessage {
    pub message: Message,
    pub payload: Bytes,
    pub content_type: String,
}

pub struct MessageExchangeService {
    object_store: Arc<dyn ObjectStore>,
    message_log: Arc<dyn MessageLog>,
    events: Arc<EventPublisher>,
    scan_metrics: Arc<dyn ScanMetrics>,
    scan_trigger: Arc<dyn ScanTrigger>,
    config: ExchangeConfig,
}

impl MessageExchangeService {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        message_log: Arc<dyn MessageLog>,
        events: Arc<EventPublisher>,
        scan_metrics: Arc<dyn ScanMetrics>,
        scan_trigger: Arc<dyn ScanTrigger>,
        config: ExchangeConfig,
    ) -> Self {
        Self {
            object_store,
            message_log,
            events,
            scan_metrics,
            scan_trigger,
            config,
        }
    }

    /// Check a Content-Type header against the allowed media types and
    /// return the bare media type.
    pub fn validate_content_type(&self, content_type: &str) -> ExchangeResult<String> {
        let media_type = media_type(content_type);
        if self
            .config
            .allowed_media_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&media_type))
        {
            Ok(media_type)
        } else {
            Err(ExchangeError::UnsupportedMediaType(content_type.to_string()))
        }
    }

    // ========================================================================
    // Partner ingestion
    // ========================================================================

    pub async fn save_new_message_from_partner(
        &self,
        submission: PartnerSubmission,
        content: MessageContent,
    ) -> ExchangeResult<ExchangeState> {
        let content_type = self.validate_content_type(&submission.content_type)?;
        let content = self.bounded(content).await?;
        let content_length = content.content_length;

        let scan_status = if self.config.malware_scan_enabled {
            ScanStatus::ScanPending
        } else {
            ScanStatus::NotScanned
        };
        let object_tags = tags::initial_tags(
            &submission.bp_id,
            &submission.message_type,
            submission.partner_topic.as_deref(),
            submission.partner_external_reference.as_deref(),
            scan_status,
            Utc::now().timestamp_millis(),
        );

        let key = submission.message_id.to_string();
        let content = validating(content, submission.message_id, &submission.bp_id);
        self.object_store
            .store(BucketType::Partner, &key, content, &content_type, object_tags)
            .await?;

        if self.config.malware_scan_enabled {
            let bucket = self.object_store.bucket_name(BucketType::Partner);
            self.scan_trigger
                .trigger_scan(bucket, &key, content_length.unwrap_or_default())
                .await?;
            tracing::info!(
                message_id = %submission.message_id,
                bp_id = %submission.bp_id,
                state = %ExchangeState::StoredAwaitingScan,
                "Partner message stored, awaiting malware scan"
            );
            return Ok(ExchangeState::StoredAwaitingScan);
        }

        self.events
            .publish_received(
                submission.message_id,
                &submission.bp_id,
                &submission.message_type,
                ScanStatus::NotScanned,
                Some(&content_type),
            )
            .await?;
        tracing::info!(
            message_id = %submission.message_id,
            bp_id = %submission.bp_id,
            state = %ExchangeState::Published,
            "Partner message stored and published"
        );
        Ok(ExchangeState::Published)
    }

    /// Handle a scanner verdict for a partner upload.
    pub async fn on_malware_scan_result(
        &self,
        notification: ScanResultNotification,
    ) -> ExchangeResult<()> {
        let arrival_millis = Utc::now().timestamp_millis();
        let ScanResultNotification {
            bucket_name,
            object_key,
            scan_result,
        } = notification;

        let status = ScanStatus::from(scan_result);
        if scan_result == ScanResult::ThreatsFound {
            tracing::warn!(bucket = %bucket_name, key = %object_key, "Malware scan found threats");
        } else if status == ScanStatus::ScanFailed {
            tracing::warn!(
                bucket = %bucket_name,
                key = %object_key,
                scan_result = %scan_result,
                "Malware scan did not complete"
            );
        }

        let message_id = Uuid::parse_str(&object_key).map_err(|_| {
            ExchangeError::illegal_state(format!(
                "Object key {} in bucket {} is not a message id",
                object_key, bucket_name
            ))
        })?;

        let merged = self
            .object_store
            .update_tags_merged(
                BucketType::Partner,
                &bucket_name,
                &object_key,
                tags::status_delta(status),
            )
            .await?;

        let scan_tags = ScanStatusTags::from_tags_validated(&bucket_name, &object_key, &merged)
            .map_err(|e| {
                e.log();
                e
            })?;

        self.scan_metrics
            .record_scan_result(scan_result, arrival_millis, scan_tags.save_time_millis);

        let content_type = self
            .object_store
            .get_content_type(BucketType::Partner, &object_key)
            .await?;

        self.events
            .publish_received(
                message_id,
                &scan_tags.bp_id,
                &scan_tags.message_type,
                scan_tags.scan_status,
                content_type.as_deref(),
            )
            .await?;

        tracing::info!(
            message_id = %message_id,
            bp_id = %scan_tags.bp_id,
            scan_status = %scan_tags.scan_status,
            state = %ExchangeState::Published,
            "Scan result applied"
        );
        Ok(())
    }

    /// Load a partner upload for an internal consumer, subject to the
    /// malware-scan delivery gate.
    pub async fn get_message_from_partner(
        &self,
        message_id: Uuid,
    ) -> ExchangeResult<Option<LoadedMessage>> {
        let Some(loaded) = self
            .object_store
            .load_with_tags(BucketType::Partner, &message_id.to_string())
            .await?
        else {
            return Ok(None);
        };

        let scan_tags = ScanStatusTags::from_tags(&loaded.tags)?;
        if let Some(status) = scan_tags
            .scan_status
            .filter(|s| !ScanStatus::is_deliverable(Some(*s)))
        {
            let err = ExchangeError::MalwareScanBlocked { message_id, status };
            err.log();
            return Err(err);
        }

        Ok(Some(loaded))
    }

    // ========================================================================
    // Internal ingestion
    // ========================================================================

    pub async fn save_new_message_from_internal_application(
        &self,
        message: Message,
        content: MessageContent,
    ) -> ExchangeResult<ExchangeState> {
        let content_type = self.validate_content_type(&message.content_type)?;
        let content = self.bounded(content).await?;
        let content = validating(content, message.message_id, &message.bp_id);

        self.object_store
            .store(
                BucketType::Internal,
                &message.object_key(),
                content,
                &content_type,
                Default::default(),
            )
            .await?;

        let message = Message {
            content_type,
            ..message
        };
        if let AppendOutcome::Inserted { sequence_id } = self.message_log.append(&message).await? {
            tracing::debug!(
                message_id = %message.message_id,
                sequence_id = sequence_id,
                "Message appended to log"
            );
        }

        // Also sent on duplicates so a retried call can repair a lost event.
        self.events.publish_sent(&message).await?;

        tracing::info!(
            message_id = %message.message_id,
            bp_id = %message.bp_id,
            state = %ExchangeState::Recorded,
            "Internal message stored"
        );
        Ok(ExchangeState::Recorded)
    }

    /// Load an internal message for a partner.
    ///
    /// `requested_content_type` is the partner's Accept value; `*/*` or
    /// `None` accepts anything.
    pub async fn get_message_from_internal_application(
        &self,
        bp_id: &str,
        message_id: Uuid,
        requested_content_type: Option<&str>,
    ) -> ExchangeResult<Option<InternalMessage>> {
        let Some(message) = self
            .message_log
            .find_by_bp_id_and_message_id(bp_id, message_id)
            .await?
        else {
            return Ok(None);
        };

        if let Some(requested) = requested_content_type {
            let requested = media_type(requested);
            if requested != ANY_CONTENT_TYPE
                && !requested.eq_ignore_ascii_case(&media_type(&message.content_type))
            {
                return Err(ExchangeError::MismatchedContentType {
                    message_id,
                    stored: message.content_type.clone(),
                    requested,
                });
            }
        }

        self.load_internal(message).await
    }

    /// Next internal message after `last_message_id` for the partner.
    pub async fn get_next_message_from_internal_application(
        &self,
        last_message_id: Option<Uuid>,
        bp_id: &str,
        filter: &MessageFilter,
    ) -> ExchangeResult<Option<InternalMessage>> {
        let Some(message) = self
            .message_log
            .next_after(last_message_id, bp_id, filter)
            .await?
        else {
            return Ok(None);
        };
        self.load_internal(message).await
    }

    /// Page of message-log rows after `last_message_id`.
    pub async fn get_messages(
        &self,
        bp_id: &str,
        filter: &MessageFilter,
        last_message_id: Option<Uuid>,
        size: u32,
    ) -> ExchangeResult<Vec<Message>> {
        self.message_log
            .list(bp_id, filter, last_message_id, size)
            .await
    }

    async fn load_internal(&self, message: Message) -> ExchangeResult<Option<InternalMessage>> {
        let Some(loaded) = self
            .object_store
            .load(BucketType::Internal, &internal_object_key(&message.bp_id, message.message_id))
            .await?
        else {
            tracing::warn!(
                message_id = %message.message_id,
                bp_id = %message.bp_id,
                "Message log row without payload"
            );
            return Ok(None);
        };

        let content_type = loaded
            .content_type
            .unwrap_or_else(|| message.content_type.clone());
        Ok(Some(InternalMessage {
            message,
            payload: loaded.payload,
            content_type,
        }))
    }

    /// Enforce the size limit; a body without declared length is buffered
    /// so the validator can check completeness.
    async fn bounded(&self, content: MessageContent) -> ExchangeResult<MessageContent> {
        let max_bytes = self.config.max_request_body_size;
        if let Some(length) = content.content_length {
            if length > max_bytes {
                return Err(ExchangeError::PayloadTooLarge { max_bytes });
            }
            return Ok(content);
        }

        let mut buffer = BytesMut::new();
        let mut body = content.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if (buffer.len() + chunk.len()) as u64 > max_bytes {
                return Err(ExchangeError::PayloadTooLarge { max_bytes });
            }
            buffer.extend_from_slice(&chunk);
        }
        Ok(MessageContent::from_bytes(buffer.freeze()))
    }
}

fn validating(content: MessageContent, message_id: Uuid, bp_id: &str) -> MessageContent {
    let validator = XmlValidator::new(message_id, bp_id, content.content_length);
    MessageContent::new(
        Box::pin(XmlValidatingStream::new(content.body, validator)),
        content.content_length,
    )
}

/// Media type without parameters, lowercased
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Body stream from in-memory chunks
pub fn chunked_content(chunks: Vec<Bytes>, content_length: Option<u64>) -> MessageContent {
    MessageContent::new(
        Box::pin(stream::iter(
            chunks.into_iter().map(Ok::<Bytes, ExchangeError>),
        )),
        content_length,
    )
}
