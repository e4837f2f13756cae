use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use exchange_config::BucketNames;
use exchange_metrics::{OBJECT_STORE_FALLBACK_HITS, OBJECT_STORE_OPERATION_DURATION};
use futures_util::stream;

use super::backend::{BlobBackend, BodyStream, PutObject};
use super::lifecycle::LifecyclePolicyInstaller;
use crate::error::{ExchangeError, ExchangeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketType {
    /// Messages produced by internal applications, keyed `bpId/messageId`
    Internal,
    /// Partner uploads, keyed by message id
    Partner,
}

impl fmt::Display for BucketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketType::Internal => f.write_str("internal"),
            BucketType::Partner => f.write_str("partner"),
        }
    }
}

/// Payload on its way into storage
pub struct MessageContent {
    pub body: BodyStream,
    pub content_length: Option<u64>,
}

impl MessageContent {
    pub fn new(body: BodyStream, content_length: Option<u64>) -> Self {
        Self {
            body,
            content_length,
        }
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let length = bytes.len() as u64;
        Self {
            body: Box::pin(stream::iter(vec![Ok::<Bytes, ExchangeError>(bytes)])),
            content_length: Some(length),
        }
    }
}

impl fmt::Debug for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContent")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Payload read back from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedMessage {
    pub payload: Bytes,
    pub content_type: Option<String>,
    /// Empty unless loaded with tags
    pub tags: HashMap<String, String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn bucket_name(&self, bucket: BucketType) -> &str;

    /// Store a payload with its tags; the lifecycle marker tag is added.
    async fn store(
        &self,
        bucket: BucketType,
        key: &str,
        content: MessageContent,
        content_type: &str,
        tags: HashMap<String, String>,
    ) -> ExchangeResult<()>;

    async fn load(&self, bucket: BucketType, key: &str) -> ExchangeResult<Option<LoadedMessage>>;

    async fn load_with_tags(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<LoadedMessage>>;

    async fn get_content_type(&self, bucket: BucketType, key: &str)
        -> ExchangeResult<Option<String>>;

    /// Merge `delta` into the object's tags and return the merged set.
    ///
    /// `bucket_name` is the bucket named by the caller and must match the
    /// configured bucket for `bucket`.
    async fn update_tags_merged(
        &self,
        bucket: BucketType,
        bucket_name: &str,
        key: &str,
        delta: HashMap<String, String>,
    ) -> ExchangeResult<HashMap<String, String>>;

    /// Startup probe of every bucket this store touches
    async fn verify_bucket_access(&self) -> ExchangeResult<()>;
}

fn observe(operation: &str, started: Instant) {
    OBJECT_STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(started.elapsed().as_secs_f64());
}

/// Read access to a pair of buckets
pub struct ReadOnlyBuckets {
    backend: Arc<dyn BlobBackend>,
    names: BucketNames,
}

impl ReadOnlyBuckets {
    pub fn new(backend: Arc<dyn BlobBackend>, names: BucketNames) -> Self {
        Self { backend, names }
    }

    pub fn bucket_name(&self, bucket: BucketType) -> &str {
        match bucket {
            BucketType::Internal => &self.names.internal,
            BucketType::Partner => &self.names.partner,
        }
    }

    pub async fn load(&self, bucket: BucketType, key: &str) -> ExchangeResult<Option<LoadedMessage>> {
        let started = Instant::now();
        let object = self
            .backend
            .get_object(self.bucket_name(bucket), key)
            .await?;
        observe("get", started);

        Ok(object.map(|o| LoadedMessage {
            payload: o.body,
            content_type: o.content_type,
            tags: HashMap::new(),
        }))
    }

    pub async fn load_with_tags(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<LoadedMessage>> {
        let Some(mut loaded) = self.load(bucket, key).await? else {
            return Ok(None);
        };

        let started = Instant::now();
        let tags = self
            .backend
            .get_object_tags(self.bucket_name(bucket), key)
            .await?;
        observe("get_tags", started);

        // Deleted between the two calls
        let Some(tags) = tags else {
            return Ok(None);
        };
        loaded.tags = tags;
        Ok(Some(loaded))
    }

    pub async fn get_content_type(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<String>> {
        let head = self
            .backend
            .head_object(self.bucket_name(bucket), key)
            .await?;
        Ok(head.and_then(|h| h.content_type))
    }

    pub async fn verify_bucket_access(&self) -> ExchangeResult<()> {
        for bucket in [&self.names.internal, &self.names.partner] {
            self.backend.head_bucket(bucket).await.map_err(|e| {
                ExchangeError::object_store(format!("bucket {} is not accessible: {}", bucket, e))
            })?;
            tracing::info!(bucket = %bucket, "Bucket is accessible");
        }
        Ok(())
    }
}

/// Primary read-write store
pub struct BucketStore {
    reader: ReadOnlyBuckets,
    backend: Arc<dyn BlobBackend>,
    lifecycle: Arc<LifecyclePolicyInstaller>,
    housekeeping_enabled: bool,
}

impl BucketStore {
    pub fn new(
        backend: Arc<dyn BlobBackend>,
        names: BucketNames,
        lifecycle: Arc<LifecyclePolicyInstaller>,
        housekeeping_enabled: bool,
    ) -> Self {
        Self {
            reader: ReadOnlyBuckets::new(backend.clone(), names),
            backend,
            lifecycle,
            housekeeping_enabled,
        }
    }
}

#[async_trait]
impl ObjectStore for BucketStore {
    fn bucket_name(&self, bucket: BucketType) -> &str {
        self.reader.bucket_name(bucket)
    }

    async fn store(
        &self,
        bucket: BucketType,
        key: &str,
        content: MessageContent,
        content_type: &str,
        mut tags: HashMap<String, String>,
    ) -> ExchangeResult<()> {
        let (marker_key, marker_value) = self.lifecycle.policy().marker_tag();
        tags.insert(marker_key, marker_value);

        let bucket_name = self.bucket_name(bucket).to_string();
        let started = Instant::now();
        let result = self
            .backend
            .put_object(PutObject {
                bucket: bucket_name.clone(),
                key: key.to_string(),
                body: content.body,
                content_length: content.content_length,
                content_type: content_type.to_string(),
                tags,
            })
            .await;
        observe("put", started);

        match &result {
            Ok(()) => tracing::debug!(
                bucket = %bucket_name,
                key = %key,
                content_length = ?content.content_length,
                "Stored object"
            ),
            Err(e) => tracing::debug!(
                bucket = %bucket_name,
                key = %key,
                error = %e,
                "Object upload aborted"
            ),
        }
        result
    }

    async fn load(&self, bucket: BucketType, key: &str) -> ExchangeResult<Option<LoadedMessage>> {
        self.reader.load(bucket, key).await
    }

    async fn load_with_tags(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<LoadedMessage>> {
        self.reader.load_with_tags(bucket, key).await
    }

    async fn get_content_type(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<String>> {
        self.reader.get_content_type(bucket, key).await
    }

    async fn update_tags_merged(
        &self,
        bucket: BucketType,
        bucket_name: &str,
        key: &str,
        delta: HashMap<String, String>,
    ) -> ExchangeResult<HashMap<String, String>> {
        let expected = self.bucket_name(bucket);
        if expected != bucket_name {
            return Err(ExchangeError::illegal_state(format!(
                "Bucket name mismatch. Expected: {}, actual: {}",
                expected, bucket_name
            )));
        }

        let started = Instant::now();
        let mut tags = self
            .backend
            .get_object_tags(bucket_name, key)
            .await?
            .ok_or_else(|| {
                ExchangeError::object_store(format!("NoSuchKey: {}/{}", bucket_name, key))
            })?;
        tags.extend(delta);
        self.backend
            .put_object_tags(bucket_name, key, tags.clone())
            .await?;
        observe("update_tags", started);

        Ok(tags)
    }

    async fn verify_bucket_access(&self) -> ExchangeResult<()> {
        self.reader.verify_bucket_access().await?;
        if self.housekeeping_enabled {
            for bucket in [BucketType::Internal, BucketType::Partner] {
                self.lifecycle
                    .ensure_installed(self.bucket_name(bucket))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Reads from `primary` and, on a miss, from the read-only fallback buckets.
/// All writes go to the primary.
pub struct FallbackObjectStore<S> {
    primary: S,
    fallback: ReadOnlyBuckets,
}

impl<S: ObjectStore> FallbackObjectStore<S> {
    pub fn new(primary: S, fallback: ReadOnlyBuckets) -> Self {
        Self { primary, fallback }
    }

    fn fallback_hit(bucket: BucketType, key: &str) {
        OBJECT_STORE_FALLBACK_HITS.inc();
        tracing::debug!(bucket = %bucket, key = %key, "Served from fallback bucket");
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for FallbackObjectStore<S> {
    fn bucket_name(&self, bucket: BucketType) -> &str {
        self.primary.bucket_name(bucket)
    }

    async fn store(
        &self,
        bucket: BucketType,
        key: &str,
        content: MessageContent,
        content_type: &str,
        tags: HashMap<String, String>,
    ) -> ExchangeResult<()> {
        self.primary
            .store(bucket, key, content, content_type, tags)
            .await
    }

    async fn load(&self, bucket: BucketType, key: &str) -> ExchangeResult<Option<LoadedMessage>> {
        if let Some(loaded) = self.primary.load(bucket, key).await? {
            return Ok(Some(loaded));
        }
        let loaded = self.fallback.load(bucket, key).await?;
        if loaded.is_some() {
            Self::fallback_hit(bucket, key);
        }
        Ok(loaded)
    }

    async fn load_with_tags(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<LoadedMessage>> {
        if let Some(loaded) = self.primary.load_with_tags(bucket, key).await? {
            return Ok(Some(loaded));
        }
        let loaded = self.fallback.load_with_tags(bucket, key).await?;
        if loaded.is_some() {
            Self::fallback_hit(bucket, key);
        }
        Ok(loaded)
    }

    async fn get_content_type(
        &self,
        bucket: BucketType,
        key: &str,
    ) -> ExchangeResult<Option<String>> {
        match self.primary.get_content_type(bucket, key).await? {
            Some(content_type) => Ok(Some(content_type)),
            None => self.fallback.get_content_type(bucket, key).await,
        }
    }

    async fn update_tags_merged(
        &self,
        bucket: BucketType,
        bucket_name: &str,
        key: &str,
        delta: HashMap<String, String>,
    ) -> ExchangeResult<HashMap<String, String>> {
        self.primary
            .update_tags_merged(bucket, bucket_name, key, delta)
            .await
    }

    async fn verify_bucket_access(&self) -> ExchangeResult<()> {
        self.primary.verify_bucket_access().await?;
        self.fallback.verify_bucket_access().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::backend::InMemoryBlobBackend;
    use crate::object_store::lifecycle::LifecyclePolicy;

    fn names(prefix: &str) -> BucketNames {
        BucketNames {
            internal: format!("{prefix}-internal"),
            partner: format!("{prefix}-partner"),
        }
    }

    fn primary_store(backend: Arc<InMemoryBlobBackend>, housekeeping: bool) -> BucketStore {
        let installer = Arc::new(LifecyclePolicyInstaller::new(
            LifecyclePolicy::new("mes-housekeeping", 14),
            backend.clone(),
        ));
        BucketStore::new(backend, names("new"), installer, housekeeping)
    }

    #[tokio::test]
    async fn test_store_adds_lifecycle_marker_tag() {
        let backend = Arc::new(InMemoryBlobBackend::with_buckets(&["new-internal", "new-partner"]));
        let store = primary_store(backend.clone(), true);

        store
            .store(
                BucketType::Partner,
                "k1",
                MessageContent::from_bytes("<a/>"),
                "application/xml",
                HashMap::from([("bpId".to_string(), "BP1".to_string())]),
            )
            .await
            .unwrap();

        let loaded = store
            .load_with_tags(BucketType::Partner, "k1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&loaded.payload[..], b"<a/>");
        assert_eq!(loaded.tags.get("mes-housekeeping").map(String::as_str), Some("14"));
        assert_eq!(loaded.tags.get("bpId").map(String::as_str), Some("BP1"));
    }

    #[tokio::test]
    async fn test_update_tags_merges_and_checks_bucket() {
        let backend = Arc::new(InMemoryBlobBackend::with_buckets(&["new-internal", "new-partner"]));
        let store = primary_store(backend.clone(), true);
        store
            .store(
                BucketType::Partner,
                "k1",
                MessageContent::from_bytes("<a/>"),
                "application/xml",
                HashMap::from([("scanStatus".to_string(), "SCAN_PENDING".to_string())]),
            )
            .await
            .unwrap();

        let delta = HashMap::from([("scanStatus".to_string(), "NO_THREATS_FOUND".to_string())]);
        let err = store
            .update_tags_merged(BucketType::Partner, "other-bucket", "k1", delta.clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Bucket name mismatch"));

        let merged = store
            .update_tags_merged(BucketType::Partner, "new-partner", "k1", delta)
            .await
            .unwrap();
        assert_eq!(merged.get("scanStatus").map(String::as_str), Some("NO_THREATS_FOUND"));
        assert!(merged.contains_key("mes-housekeeping"));
    }

    #[tokio::test]
    async fn test_fallback_only_on_primary_miss() {
        let backend = Arc::new(InMemoryBlobBackend::with_buckets(&["new-internal", "new-partner"]));
        let old_backend =
            Arc::new(InMemoryBlobBackend::with_buckets(&["old-internal", "old-partner"]));
        let store = FallbackObjectStore::new(
            primary_store(backend.clone(), false),
            ReadOnlyBuckets::new(old_backend.clone(), names("old")),
        );

        let old = BucketStore::new(
            old_backend.clone(),
            names("old"),
            Arc::new(LifecyclePolicyInstaller::new(
                LifecyclePolicy::new("mes-housekeeping", 15),
                old_backend.clone(),
            )),
            false,
        );
        old.store(
            BucketType::Internal,
            "BP1/k1",
            MessageContent::from_bytes("<old/>"),
            "application/xml",
            HashMap::new(),
        )
        .await
        .unwrap();

        let loaded = store.load(BucketType::Internal, "BP1/k1").await.unwrap().unwrap();
        assert_eq!(&loaded.payload[..], b"<old/>");

        store
            .store(
                BucketType::Internal,
                "BP1/k1",
                MessageContent::from_bytes("<new/>"),
                "application/xml",
                HashMap::new(),
            )
            .await
            .unwrap();
        let loaded = store.load(BucketType::Internal, "BP1/k1").await.unwrap().unwrap();
        assert_eq!(&loaded.payload[..], b"<new/>");
        assert_eq!(old_backend.object_count("old-internal").await, 1);
        assert_eq!(backend.object_count("new-internal").await, 1);

        assert!(store.load(BucketType::Internal, "BP1/none").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_installs_lifecycle_only_when_housekeeping_enabled() {
        let backend = Arc::new(InMemoryBlobBackend::with_buckets(&["new-internal", "new-partner"]));

        primary_store(backend.clone(), false)
            .verify_bucket_access()
            .await
            .unwrap();
        assert_eq!(backend.lifecycle_writes(), 0);

        primary_store(backend.clone(), true)
            .verify_bucket_access()
            .await
            .unwrap();
        assert_eq!(backend.lifecycle_writes(), 2);
    }

    #[tokio::test]
    async fn test_verify_fails_for_missing_bucket() {
        let backend = Arc::new(InMemoryBlobBackend::with_buckets(&["new-internal"]));
        let err = primary_store(backend, true)
            .verify_bucket_access()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("new-partner"));
    }
}
