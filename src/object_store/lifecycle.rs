//! Bucket lifecycle rules for message housekeeping.
//!
//! Every stored object carries a marker tag `policyName = expirationDays`.
//! A single lifecycle rule per bucket, filtered on that tag, expires the
//! objects after the configured number of days.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::backend::BlobBackend;
use crate::error::ExchangeResult;

/// Noncurrent object versions are removed one day after being replaced
pub const NONCURRENT_EXPIRATION_DAYS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleRuleStatus {
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleFilter {
    pub prefix: Option<String>,
    /// All tags must match for the rule to apply
    pub tags: HashMap<String, String>,
}

impl LifecycleFilter {
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleRule {
    pub id: String,
    pub status: LifecycleRuleStatus,
    pub filter: LifecycleFilter,
    pub expiration_days: Option<u32>,
    pub noncurrent_expiration_days: Option<u32>,
}

impl LifecycleRule {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: LifecycleRuleStatus::Enabled,
            filter: LifecycleFilter::default(),
            expiration_days: None,
            noncurrent_expiration_days: None,
        }
    }

    pub fn with_filter(mut self, filter: LifecycleFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_expiration_days(mut self, days: u32) -> Self {
        self.expiration_days = Some(days);
        self
    }

    pub fn with_noncurrent_expiration(mut self, days: u32) -> Self {
        self.noncurrent_expiration_days = Some(days);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfiguration {
    pub rules: Vec<LifecycleRule>,
}

impl LifecycleConfiguration {
    pub fn get_rule(&self, id: &str) -> Option<&LifecycleRule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

/// The housekeeping rule derived from policy name and retention
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecyclePolicy {
    policy_name: String,
    expiration_days: u32,
}

impl LifecyclePolicy {
    pub fn new(policy_name: impl Into<String>, expiration_days: u32) -> Self {
        Self {
            policy_name: policy_name.into(),
            expiration_days,
        }
    }

    pub fn rule_id(&self) -> String {
        format!("{}-{}", self.policy_name, self.expiration_days)
    }

    /// Tag attached to every object written by this service
    pub fn marker_tag(&self) -> (String, String) {
        (self.policy_name.clone(), self.expiration_days.to_string())
    }

    pub fn rule(&self) -> LifecycleRule {
        let (key, value) = self.marker_tag();
        LifecycleRule::new(&self.rule_id())
            .with_filter(LifecycleFilter::default().with_tag(&key, &value))
            .with_expiration_days(self.expiration_days)
            .with_noncurrent_expiration(NONCURRENT_EXPIRATION_DAYS)
    }

    pub fn is_installed(&self, configuration: Option<&LifecycleConfiguration>) -> bool {
        let id = self.rule_id();
        configuration.is_some_and(|c| c.get_rule(&id).is_some())
    }

    /// Existing rules are kept; the housekeeping rule is appended.
    pub fn merge_into(&self, existing: Option<LifecycleConfiguration>) -> LifecycleConfiguration {
        let mut configuration = existing.unwrap_or_default();
        let id = self.rule_id();
        configuration.rules.retain(|r| r.id != id);
        configuration.rules.push(self.rule());
        configuration
    }
}

/// Makes sure each bucket carries the housekeeping rule.
///
/// Buckets already verified by this instance are remembered; other
/// instances keep their own set, so the live configuration is always the
/// final word.
pub struct LifecyclePolicyInstaller {
    policy: LifecyclePolicy,
    backend: Arc<dyn BlobBackend>,
    verified_buckets: RwLock<HashSet<String>>,
}

impl LifecyclePolicyInstaller {
    pub fn new(policy: LifecyclePolicy, backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            policy,
            backend,
            verified_buckets: RwLock::new(HashSet::new()),
        }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub async fn ensure_installed(&self, bucket: &str) -> ExchangeResult<()> {
        if self.verified_buckets.read().await.contains(bucket) {
            tracing::debug!(bucket = %bucket, "Lifecycle policy already verified");
            return Ok(());
        }

        let current = self.backend.get_lifecycle_configuration(bucket).await?;
        if self.policy.is_installed(current.as_ref()) {
            tracing::info!(
                bucket = %bucket,
                rule_id = %self.policy.rule_id(),
                "Lifecycle policy already present"
            );
        } else {
            let merged = self.policy.merge_into(current);
            tracing::info!(
                bucket = %bucket,
                rule_id = %self.policy.rule_id(),
                rule_count = merged.rules.len(),
                "Installing lifecycle policy"
            );
            self.backend
                .put_lifecycle_configuration(bucket, &merged)
                .await?;
        }

        self.verified_buckets.write().await.insert(bucket.to_string());
        Ok(())
    }
}
