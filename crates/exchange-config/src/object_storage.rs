// ============================================================================
// Object Storage Configuration
// ============================================================================

use crate::constants::*;

/// Bucket names for the two message origins
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketNames {
    pub internal: String,
    pub partner: String,
}

/// Where and how to reach one S3-compatible store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConnection {
    /// Custom endpoint URL; the provider default when unset
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Address buckets as `endpoint/bucket` instead of `bucket.endpoint`
    pub path_style_access: bool,
}

impl Default for StorageConnection {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: DEFAULT_OBJECT_STORAGE_REGION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            path_style_access: false,
        }
    }
}

impl StorageConnection {
    /// Reads `<prefix>ENDPOINT`, `<prefix>REGION`, `<prefix>ACCESS_KEY_ID`,
    /// `<prefix>SECRET_ACCESS_KEY` and `<prefix>PATH_STYLE_ACCESS`.
    pub(crate) fn from_env(prefix: &str) -> Self {
        let var = |name: &str| {
            std::env::var(format!("{prefix}{name}"))
                .ok()
                .filter(|v| !v.trim().is_empty())
        };

        Self {
            endpoint: var("ENDPOINT"),
            region: var("REGION").unwrap_or_else(|| DEFAULT_OBJECT_STORAGE_REGION.to_string()),
            access_key_id: var("ACCESS_KEY_ID"),
            secret_access_key: var("SECRET_ACCESS_KEY"),
            path_style_access: var("PATH_STYLE_ACCESS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}

/// Read-only store consulted when the primary misses.
/// Has its own connection so payloads can be migrated between providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackStorageConfig {
    pub connection: StorageConnection,
    pub buckets: BucketNames,
}

#[derive(Clone, Debug)]
pub struct ObjectStorageConfig {
    pub connection: StorageConnection,
    pub buckets: BucketNames,
    /// Only set when both fallback bucket variables are present
    pub fallback: Option<FallbackStorageConfig>,
    /// Name of the marker tag (and rule-id prefix) used for lifecycle expiry
    pub lifecycle_policy_name: String,
}

impl ObjectStorageConfig {
    pub(crate) fn from_env() -> Self {
        let fallback_internal = std::env::var("OBJECT_STORAGE_FALLBACK_BUCKET_INTERNAL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let fallback_partner = std::env::var("OBJECT_STORAGE_FALLBACK_BUCKET_PARTNER")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let fallback = match (fallback_internal, fallback_partner) {
            (Some(internal), Some(partner)) => Some(FallbackStorageConfig {
                connection: StorageConnection::from_env("OBJECT_STORAGE_FALLBACK_"),
                buckets: BucketNames { internal, partner },
            }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "Only one fallback bucket is configured, fallback reads are disabled"
                );
                None
            }
        };

        Self {
            connection: StorageConnection::from_env("OBJECT_STORAGE_"),
            buckets: BucketNames {
                internal: std::env::var("OBJECT_STORAGE_BUCKET_INTERNAL")
                    .unwrap_or_else(|_| DEFAULT_BUCKET_INTERNAL.to_string()),
                partner: std::env::var("OBJECT_STORAGE_BUCKET_PARTNER")
                    .unwrap_or_else(|_| DEFAULT_BUCKET_PARTNER.to_string()),
            },
            fallback,
            lifecycle_policy_name: std::env::var("LIFECYCLE_POLICY_NAME")
                .unwrap_or_else(|_| DEFAULT_LIFECYCLE_POLICY_NAME.to_string()),
        }
    }
}
