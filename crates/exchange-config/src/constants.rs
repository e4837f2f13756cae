// ============================================================================
// Configuration Constants
// ============================================================================

// Housekeeping defaults
pub(crate) const DEFAULT_HOUSEKEEPING_BATCH_SIZE: u32 = 100;
pub(crate) const DEFAULT_HOUSEKEEPING_MAX_BATCHES: u32 = 100_000;
pub(crate) const DEFAULT_HOUSEKEEPING_EXPIRATION_DAYS: u32 = 14;
pub(crate) const DEFAULT_HOUSEKEEPING_INTERVAL_SECS: u64 = 3600;

// Object storage defaults
pub(crate) const DEFAULT_LIFECYCLE_POLICY_NAME: &str = "mes-housekeeping";
pub(crate) const DEFAULT_BUCKET_INTERNAL: &str = "mes-internal";
pub(crate) const DEFAULT_BUCKET_PARTNER: &str = "mes-partner";
pub(crate) const DEFAULT_OBJECT_STORAGE_REGION: &str = "eu-central-1";

// Event defaults
pub(crate) const DEFAULT_TOPIC_MESSAGE_RECEIVED: &str = "b2b-message-received";
pub(crate) const DEFAULT_TOPIC_MESSAGE_SENT: &str = "b2b-message-sent";
pub(crate) const DEFAULT_SYSTEM_NAME: &str = "b2b";
pub(crate) const DEFAULT_SERVICE_NAME: &str = "message-exchange-service";

pub const DEFAULT_ALLOWED_MEDIA_TYPES: &[&str] = &["application/xml", "text/xml"];

// Request body limit (in bytes)
pub const MAX_REQUEST_BODY_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

// Time conversion constants
pub const MILLIS_PER_SECOND: i64 = 1000;
