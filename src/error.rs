use thiserror::Error;
use uuid::Uuid;

use crate::object_store::tags::ScanStatus;

pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Coarse classification used by callers to decide between rejecting,
/// alerting and retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The submitted content or request is wrong; retrying will not help
    InputDefect,
    /// Stored state does not match what the pipeline expects
    ConsistencyDefect,
    /// An external system failed; the operation can be retried
    Transient,
    /// The content exists but must not be handed out
    Blocked,
}

/// Error type for the exchange pipeline
#[derive(Error, Debug)]
pub enum ExchangeError {
    // ===== Content Errors =====
    #[error("XML content invalid - not a well-formed XML message: {reason}")]
    MalformedXml {
        message_id: Uuid,
        bp_id: String,
        reason: String,
    },

    #[error("XML content invalid - incomplete XML")]
    IncompleteXml { message_id: Uuid, bp_id: String },

    #[error("Payload exceeds the maximum size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: u64 },

    #[error("Media type is not supported: {0}")]
    UnsupportedMediaType(String),

    #[error("Message {message_id} has content type {stored} but requested content type is {requested}")]
    MismatchedContentType {
        message_id: Uuid,
        stored: String,
        requested: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    // ===== Consistency Errors =====
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Not all needed tags are present for object {bucket}-{key}, tags: {tags}")]
    MissingTags {
        bucket: String,
        key: String,
        tags: String,
    },

    // ===== Delivery Errors =====
    #[error("Message {message_id} cannot be delivered, malware scan status is {status}")]
    MalwareScanBlocked { message_id: Uuid, status: ScanStatus },

    // ===== Infrastructure Errors =====
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Object store error: {0}")]
    ObjectStore(String),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

impl From<rdkafka::error::KafkaError> for ExchangeError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        ExchangeError::Kafka(err.to_string())
    }
}

impl ExchangeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExchangeError::MalformedXml { .. }
            | ExchangeError::IncompleteXml { .. }
            | ExchangeError::PayloadTooLarge { .. }
            | ExchangeError::UnsupportedMediaType(_)
            | ExchangeError::MismatchedContentType { .. }
            | ExchangeError::Validation(_) => ErrorKind::InputDefect,
            ExchangeError::IllegalState(_) | ExchangeError::MissingTags { .. } => {
                ErrorKind::ConsistencyDefect
            }
            ExchangeError::MalwareScanBlocked { .. } => ErrorKind::Blocked,
            ExchangeError::Database(_)
            | ExchangeError::ObjectStore(_)
            | ExchangeError::Kafka(_)
            | ExchangeError::Json(_)
            | ExchangeError::Io(_)
            | ExchangeError::Unknown(_) => ErrorKind::Transient,
        }
    }

    /// Get error code for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ExchangeError::MalformedXml { .. } => "MALFORMED_XML",
            ExchangeError::IncompleteXml { .. } => "INCOMPLETE_XML",
            ExchangeError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ExchangeError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ExchangeError::MismatchedContentType { .. } => "MISMATCHED_CONTENT_TYPE",
            ExchangeError::Validation(_) => "VALIDATION_ERROR",
            ExchangeError::IllegalState(_) => "ILLEGAL_STATE",
            ExchangeError::MissingTags { .. } => "MISSING_TAGS",
            ExchangeError::MalwareScanBlocked { .. } => "MALWARE_SCAN_BLOCKED",
            ExchangeError::Database(_) => "DATABASE_ERROR",
            ExchangeError::ObjectStore(_) => "OBJECT_STORE_ERROR",
            ExchangeError::Kafka(_) => "KAFKA_ERROR",
            ExchangeError::Json(_) => "JSON_ERROR",
            ExchangeError::Io(_) => "IO_ERROR",
            ExchangeError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    /// Log error with appropriate level
    pub fn log(&self) {
        let code = self.error_code();

        match self.kind() {
            ErrorKind::Transient => {
                tracing::error!(error = %self, error_code = %code, "Infrastructure error occurred");
            }
            ErrorKind::ConsistencyDefect => {
                tracing::error!(error = %self, error_code = %code, "Consistency defect detected");
            }
            ErrorKind::Blocked => {
                tracing::error!(error = %self, error_code = %code, "Delivery blocked");
            }
            ErrorKind::InputDefect => {
                tracing::debug!(error = %self, error_code = %code, "Rejected input");
            }
        }
    }

    /// True for failures worth retrying with the same input
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

// ===== Helper constructors =====
impl ExchangeError {
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        ExchangeError::IllegalState(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ExchangeError::Validation(msg.into())
    }

    pub fn object_store(msg: impl Into<String>) -> Self {
        ExchangeError::ObjectStore(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_errors_are_input_defects() {
        let err = ExchangeError::IncompleteXml {
            message_id: Uuid::new_v4(),
            bp_id: "BP1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::InputDefect);
        assert_eq!(err.error_code(), "INCOMPLETE_XML");
        assert_eq!(err.to_string(), "XML content invalid - incomplete XML");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_mismatched_content_type_message() {
        let id = Uuid::nil();
        let err = ExchangeError::MismatchedContentType {
            message_id: id,
            stored: "application/xml".to_string(),
            requested: "text/xml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            format!(
                "Message {} has content type application/xml but requested content type is text/xml",
                id
            )
        );
    }

    #[test]
    fn test_infrastructure_errors_are_retryable() {
        assert!(ExchangeError::object_store("timeout").is_retryable());
        assert_eq!(
            ExchangeError::illegal_state("x").kind(),
            ErrorKind::ConsistencyDefect
        );
    }
}
