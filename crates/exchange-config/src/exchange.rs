// ============================================================================
// Exchange Pipeline Configuration
// ============================================================================

use crate::constants::*;

/// Switches and limits for the ingestion pipeline itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeConfig {
    /// Partner uploads wait for an external malware verdict before publication
    pub malware_scan_enabled: bool,
    /// Publish a "message sent" event after an internal message is recorded
    pub message_sent_event_enabled: bool,
    /// Upper bound for a single payload (bytes)
    pub max_request_body_size: u64,
    /// Accepted content types, compared without parameters
    pub allowed_media_types: Vec<String>,
}

impl ExchangeConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            malware_scan_enabled: std::env::var("MALWARE_SCAN_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            message_sent_event_enabled: std::env::var("MESSAGE_SENT_EVENT_ENABLED")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            max_request_body_size: std::env::var("MAX_REQUEST_BODY_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(MAX_REQUEST_BODY_SIZE),
            allowed_media_types: std::env::var("ALLOWED_MEDIA_TYPES")
                .ok()
                .map(|v| parse_media_types(&v))
                .filter(|types| !types.is_empty())
                .unwrap_or_else(|| {
                    DEFAULT_ALLOWED_MEDIA_TYPES
                        .iter()
                        .map(|t| t.to_string())
                        .collect()
                }),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            malware_scan_enabled: false,
            message_sent_event_enabled: false,
            max_request_body_size: MAX_REQUEST_BODY_SIZE,
            allowed_media_types: DEFAULT_ALLOWED_MEDIA_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

fn parse_media_types(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}
