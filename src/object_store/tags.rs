//! Scan-status metadata kept as object tags on partner uploads.
//!
//! The tag keys below are the persisted schema. Keys may be added but never
//! renamed, since objects written by older releases stay readable until
//! they expire.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExchangeError, ExchangeResult};
use crate::scan::ScanResult;

pub const TAG_BP_ID: &str = "bpId";
pub const TAG_MESSAGE_TYPE: &str = "messageType";
pub const TAG_PARTNER_TOPIC: &str = "partnerTopic";
pub const TAG_PARTNER_EXTERNAL_REFERENCE: &str = "partnerExternalReference";
pub const TAG_SCAN_STATUS: &str = "scanStatus";
pub const TAG_SAVE_TIME_MILLIS: &str = "saveTimeInMillis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanStatus {
    NotScanned,
    ScanPending,
    NoThreatsFound,
    ThreatsFound,
    ScanFailed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::NotScanned => "NOT_SCANNED",
            ScanStatus::ScanPending => "SCAN_PENDING",
            ScanStatus::NoThreatsFound => "NO_THREATS_FOUND",
            ScanStatus::ThreatsFound => "THREATS_FOUND",
            ScanStatus::ScanFailed => "SCAN_FAILED",
        }
    }

    /// Delivery gate. Objects without a status predate scanning and pass.
    pub fn is_deliverable(status: Option<ScanStatus>) -> bool {
        matches!(
            status,
            None | Some(ScanStatus::NotScanned) | Some(ScanStatus::NoThreatsFound)
        )
    }
}

impl From<ScanResult> for ScanStatus {
    fn from(result: ScanResult) -> Self {
        match result {
            ScanResult::NoThreatsFound => ScanStatus::NoThreatsFound,
            ScanResult::ThreatsFound => ScanStatus::ThreatsFound,
            ScanResult::Unsupported | ScanResult::AccessDenied | ScanResult::Failed => {
                ScanStatus::ScanFailed
            }
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_SCANNED" => Ok(ScanStatus::NotScanned),
            "SCAN_PENDING" => Ok(ScanStatus::ScanPending),
            "NO_THREATS_FOUND" => Ok(ScanStatus::NoThreatsFound),
            "THREATS_FOUND" => Ok(ScanStatus::ThreatsFound),
            "SCAN_FAILED" => Ok(ScanStatus::ScanFailed),
            other => Err(ExchangeError::validation(format!(
                "unknown scan status '{}'",
                other
            ))),
        }
    }
}

/// Tag values as read back, every field optional
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanStatusTags {
    pub bp_id: Option<String>,
    pub message_type: Option<String>,
    pub partner_topic: Option<String>,
    pub partner_external_reference: Option<String>,
    pub scan_status: Option<ScanStatus>,
    pub save_time_millis: Option<i64>,
}

/// Tags with the fields the scan-result path depends on guaranteed present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedScanTags {
    pub bp_id: String,
    pub message_type: String,
    pub scan_status: ScanStatus,
    pub partner_topic: Option<String>,
    pub partner_external_reference: Option<String>,
    pub save_time_millis: Option<i64>,
}

/// Full tag set written with a new partner upload
pub fn initial_tags(
    bp_id: &str,
    message_type: &str,
    partner_topic: Option<&str>,
    partner_external_reference: Option<&str>,
    status: ScanStatus,
    save_time_millis: i64,
) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert(TAG_BP_ID.to_string(), bp_id.to_string());
    tags.insert(TAG_MESSAGE_TYPE.to_string(), message_type.to_string());
    if let Some(topic) = partner_topic.filter(|t| !t.is_empty()) {
        tags.insert(TAG_PARTNER_TOPIC.to_string(), topic.to_string());
    }
    if let Some(reference) = partner_external_reference.filter(|r| !r.is_empty()) {
        tags.insert(TAG_PARTNER_EXTERNAL_REFERENCE.to_string(), reference.to_string());
    }
    tags.insert(TAG_SCAN_STATUS.to_string(), status.as_str().to_string());
    tags.insert(TAG_SAVE_TIME_MILLIS.to_string(), save_time_millis.to_string());
    tags
}

/// Partial tag set that only changes the scan status
pub fn status_delta(status: ScanStatus) -> HashMap<String, String> {
    HashMap::from([(TAG_SCAN_STATUS.to_string(), status.as_str().to_string())])
}

impl ScanStatusTags {
    /// Lenient parse: absent keys stay `None`, unreadable values are errors.
    pub fn from_tags(tags: &HashMap<String, String>) -> ExchangeResult<Self> {
        let scan_status = tags
            .get(TAG_SCAN_STATUS)
            .map(|s| s.parse::<ScanStatus>())
            .transpose()?;
        let save_time_millis = tags
            .get(TAG_SAVE_TIME_MILLIS)
            .map(|s| {
                s.parse::<i64>().map_err(|_| {
                    ExchangeError::validation(format!("invalid {} tag '{}'", TAG_SAVE_TIME_MILLIS, s))
                })
            })
            .transpose()?;

        Ok(Self {
            bp_id: tags.get(TAG_BP_ID).cloned(),
            message_type: tags.get(TAG_MESSAGE_TYPE).cloned(),
            partner_topic: tags.get(TAG_PARTNER_TOPIC).cloned(),
            partner_external_reference: tags.get(TAG_PARTNER_EXTERNAL_REFERENCE).cloned(),
            scan_status,
            save_time_millis,
        })
    }

    /// Strict parse for the scan-result path.
    pub fn from_tags_validated(
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> ExchangeResult<ValidatedScanTags> {
        let parsed = Self::from_tags(tags)?;
        match (parsed.bp_id, parsed.message_type, parsed.scan_status) {
            (Some(bp_id), Some(message_type), Some(scan_status)) => Ok(ValidatedScanTags {
                bp_id,
                message_type,
                scan_status,
                partner_topic: parsed.partner_topic,
                partner_external_reference: parsed.partner_external_reference,
                save_time_millis: parsed.save_time_millis,
            }),
            _ => {
                let mut keys: Vec<&str> = tags.keys().map(String::as_str).collect();
                keys.sort_unstable();
                Err(ExchangeError::MissingTags {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    tags: keys.join(","),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_tags_round_trip() {
        let tags = initial_tags(
            "BP1",
            "ORDERS",
            Some("orders-topic"),
            None,
            ScanStatus::ScanPending,
            1_700_000_000_000,
        );
        let parsed = ScanStatusTags::from_tags(&tags).unwrap();

        assert_eq!(parsed.bp_id.as_deref(), Some("BP1"));
        assert_eq!(parsed.message_type.as_deref(), Some("ORDERS"));
        assert_eq!(parsed.partner_topic.as_deref(), Some("orders-topic"));
        assert_eq!(parsed.partner_external_reference, None);
        assert_eq!(parsed.scan_status, Some(ScanStatus::ScanPending));
        assert_eq!(parsed.save_time_millis, Some(1_700_000_000_000));
        assert!(!tags.contains_key(TAG_PARTNER_EXTERNAL_REFERENCE));
    }

    #[test]
    fn test_full_tag_set_round_trip() {
        let tags = initial_tags(
            "BP1",
            "INVOIC",
            Some("invoices-eu"),
            Some("PO-2231"),
            ScanStatus::NoThreatsFound,
            1_700_000_000_123,
        );
        assert_eq!(tags.len(), 6);

        let expected = ScanStatusTags {
            bp_id: Some("BP1".to_string()),
            message_type: Some("INVOIC".to_string()),
            partner_topic: Some("invoices-eu".to_string()),
            partner_external_reference: Some("PO-2231".to_string()),
            scan_status: Some(ScanStatus::NoThreatsFound),
            save_time_millis: Some(1_700_000_000_123),
        };
        assert_eq!(ScanStatusTags::from_tags(&tags).unwrap(), expected);

        let validated = ScanStatusTags::from_tags_validated("partner", "k1", &tags).unwrap();
        assert_eq!(
            validated,
            ValidatedScanTags {
                bp_id: "BP1".to_string(),
                message_type: "INVOIC".to_string(),
                scan_status: ScanStatus::NoThreatsFound,
                partner_topic: Some("invoices-eu".to_string()),
                partner_external_reference: Some("PO-2231".to_string()),
                save_time_millis: Some(1_700_000_000_123),
            }
        );
    }

    #[test]
    fn test_validated_parse_rejects_empty_tags() {
        let err = ScanStatusTags::from_tags_validated("partner", "k1", &HashMap::new()).unwrap_err();
        match err {
            ExchangeError::MissingTags { bucket, key, tags } => {
                assert_eq!(bucket, "partner");
                assert_eq!(key, "k1");
                assert!(tags.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_tags_parse_to_all_none() {
        let parsed = ScanStatusTags::from_tags(&HashMap::new()).unwrap();
        assert_eq!(parsed, ScanStatusTags::default());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let tags = HashMap::from([(TAG_SCAN_STATUS.to_string(), "MAYBE".to_string())]);
        assert!(ScanStatusTags::from_tags(&tags).is_err());
    }

    #[test]
    fn test_validated_parse_requires_core_tags() {
        let tags = HashMap::from([
            (TAG_BP_ID.to_string(), "BP1".to_string()),
            (TAG_SCAN_STATUS.to_string(), "SCAN_PENDING".to_string()),
        ]);
        let err = ScanStatusTags::from_tags_validated("partner", "k1", &tags).unwrap_err();
        assert!(matches!(err, ExchangeError::MissingTags { .. }));
        assert!(err.to_string().contains("partner-k1"));
    }

    #[test]
    fn test_validated_parse_allows_missing_save_time() {
        let tags = HashMap::from([
            (TAG_BP_ID.to_string(), "BP1".to_string()),
            (TAG_MESSAGE_TYPE.to_string(), "ORDERS".to_string()),
            (TAG_SCAN_STATUS.to_string(), "SCAN_FAILED".to_string()),
        ]);
        let validated = ScanStatusTags::from_tags_validated("partner", "k1", &tags).unwrap();
        assert_eq!(validated.scan_status, ScanStatus::ScanFailed);
        assert_eq!(validated.save_time_millis, None);
    }

    #[test]
    fn test_delivery_gate() {
        assert!(ScanStatus::is_deliverable(None));
        assert!(ScanStatus::is_deliverable(Some(ScanStatus::NotScanned)));
        assert!(ScanStatus::is_deliverable(Some(ScanStatus::NoThreatsFound)));
        assert!(!ScanStatus::is_deliverable(Some(ScanStatus::ScanPending)));
        assert!(!ScanStatus::is_deliverable(Some(ScanStatus::ThreatsFound)));
        assert!(!ScanStatus::is_deliverable(Some(ScanStatus::ScanFailed)));
    }

    #[test]
    fn test_scan_result_mapping() {
        assert_eq!(ScanStatus::from(ScanResult::NoThreatsFound), ScanStatus::NoThreatsFound);
        assert_eq!(ScanStatus::from(ScanResult::ThreatsFound), ScanStatus::ThreatsFound);
        assert_eq!(ScanStatus::from(ScanResult::Unsupported), ScanStatus::ScanFailed);
        assert_eq!(ScanStatus::from(ScanResult::AccessDenied), ScanStatus::ScanFailed);
        assert_eq!(ScanStatus::from(ScanResult::Failed), ScanStatus::ScanFailed);
    }
}
