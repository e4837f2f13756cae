//! Malware scanner interaction: verdicts coming in, scan requests going out.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;

/// Verdict reported by the external scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanResult {
    NoThreatsFound,
    ThreatsFound,
    Unsupported,
    AccessDenied,
    Failed,
}

impl ScanResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanResult::NoThreatsFound => "NO_THREATS_FOUND",
            ScanResult::ThreatsFound => "THREATS_FOUND",
            ScanResult::Unsupported => "UNSUPPORTED",
            ScanResult::AccessDenied => "ACCESS_DENIED",
            ScanResult::Failed => "FAILED",
        }
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scan notification as delivered by the scanner integration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResultNotification {
    pub bucket_name: String,
    pub object_key: String,
    pub scan_result: ScanResult,
}

/// Asks the scanner to look at a freshly stored object.
///
/// Scanners that watch the bucket themselves need no explicit request, so
/// the default implementation does nothing.
#[async_trait]
pub trait ScanTrigger: Send + Sync {
    async fn trigger_scan(&self, bucket: &str, key: &str, content_length: u64) -> ExchangeResult<()> {
        tracing::trace!(bucket = %bucket, key = %key, content_length, "Scan is triggered by the bucket");
        Ok(())
    }
}

/// Scanner is notified by bucket events
pub struct BucketEventScanTrigger;

#[async_trait]
impl ScanTrigger for BucketEventScanTrigger {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_shape() {
        let json = r#"{"bucketName":"partner","objectKey":"k1","scanResult":"THREATS_FOUND"}"#;
        let notification: ScanResultNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.scan_result, ScanResult::ThreatsFound);
        assert_eq!(notification.object_key, "k1");
    }

    #[tokio::test]
    async fn test_bucket_event_trigger_is_a_no_op() {
        assert!(BucketEventScanTrigger
            .trigger_scan("partner", "k1", 10)
            .await
            .is_ok());
    }
}
