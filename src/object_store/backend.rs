//! Blob storage backend abstraction.
//!
//! The backend is the thin seam over an S3-compatible service: buckets,
//! keys, opaque bodies, a small tag map per object and a bucket lifecycle
//! configuration. Everything above it (bucket selection, tag semantics,
//! fallback reads) lives in [`super::adapter`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use tokio::sync::RwLock;

use super::lifecycle::LifecycleConfiguration;
use crate::error::{ExchangeError, ExchangeResult};

/// Upload body. Errors yielded by the stream abort the upload unchanged.
pub type BodyStream = Pin<Box<dyn Stream<Item = ExchangeResult<Bytes>> + Send>>;

/// S3 allows at most this many tags per object
pub const MAX_TAGS_PER_OBJECT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub content_type: Option<String>,
    pub content_length: u64,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Request for a single object upload
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: BodyStream,
    pub content_length: Option<u64>,
    pub content_type: String,
    pub tags: HashMap<String, String>,
}

#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Upload an object. Nothing becomes visible unless the whole body was read.
    async fn put_object(&self, request: PutObject) -> ExchangeResult<()>;

    /// Returns `None` when the key does not exist
    async fn get_object(&self, bucket: &str, key: &str) -> ExchangeResult<Option<StoredObject>>;

    async fn head_object(&self, bucket: &str, key: &str) -> ExchangeResult<Option<ObjectHead>>;

    async fn get_object_tags(
        &self,
        bucket: &str,
        key: &str,
    ) -> ExchangeResult<Option<HashMap<String, String>>>;

    /// Replace the full tag set of an existing object
    async fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: HashMap<String, String>,
    ) -> ExchangeResult<()>;

    /// Fails when the bucket does not exist or is not accessible
    async fn head_bucket(&self, bucket: &str) -> ExchangeResult<()>;

    /// Returns `None` when the bucket has no lifecycle configuration
    async fn get_lifecycle_configuration(
        &self,
        bucket: &str,
    ) -> ExchangeResult<Option<LifecycleConfiguration>>;

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        configuration: &LifecycleConfiguration,
    ) -> ExchangeResult<()>;
}

fn check_tags(tags: &HashMap<String, String>) -> ExchangeResult<()> {
    if tags.len() > MAX_TAGS_PER_OBJECT {
        return Err(ExchangeError::object_store(format!(
            "object tag limit exceeded: {} > {}",
            tags.len(),
            MAX_TAGS_PER_OBJECT
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Bytes,
    content_type: String,
    tags: HashMap<String, String>,
}

#[derive(Debug, Default)]
struct MemoryBucket {
    objects: HashMap<String, MemoryObject>,
    lifecycle: Option<LifecycleConfiguration>,
}

/// In-process backend used for tests and local runs
#[derive(Debug, Default)]
pub struct InMemoryBlobBackend {
    buckets: RwLock<HashMap<String, MemoryBucket>>,
    lifecycle_writes: AtomicUsize,
    tag_writes: AtomicUsize,
}

impl InMemoryBlobBackend {
    pub fn with_buckets(names: &[&str]) -> Self {
        let buckets = names
            .iter()
            .map(|name| (name.to_string(), MemoryBucket::default()))
            .collect();
        Self {
            buckets: RwLock::new(buckets),
            lifecycle_writes: AtomicUsize::new(0),
            tag_writes: AtomicUsize::new(0),
        }
    }

    pub async fn create_bucket(&self, name: &str) {
        self.buckets
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Number of lifecycle configuration writes so far
    pub fn lifecycle_writes(&self) -> usize {
        self.lifecycle_writes.load(Ordering::SeqCst)
    }

    /// Number of tag-set replacements so far
    pub fn tag_writes(&self) -> usize {
        self.tag_writes.load(Ordering::SeqCst)
    }

    pub async fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|b| b.objects.len())
            .unwrap_or(0)
    }
}

fn no_such_bucket(bucket: &str) -> ExchangeError {
    ExchangeError::object_store(format!("NoSuchBucket: {}", bucket))
}

#[async_trait]
impl BlobBackend for InMemoryBlobBackend {
    async fn put_object(&self, request: PutObject) -> ExchangeResult<()> {
        check_tags(&request.tags)?;
        if !self.buckets.read().await.contains_key(&request.bucket) {
            return Err(no_such_bucket(&request.bucket));
        }

        let mut body = BytesMut::new();
        let mut stream = request.body;
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }

        if let Some(expected) = request.content_length {
            if body.len() as u64 != expected {
                return Err(ExchangeError::object_store(format!(
                    "content length mismatch for {}/{}: declared {}, received {}",
                    request.bucket,
                    request.key,
                    expected,
                    body.len()
                )));
            }
        }

        let mut buckets = self.buckets.write().await;
        let bucket = buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;
        bucket.objects.insert(
            request.key,
            MemoryObject {
                body: body.freeze(),
                content_type: request.content_type,
                tags: request.tags,
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> ExchangeResult<Option<StoredObject>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(bucket.objects.get(key).map(|o| StoredObject {
            body: o.body.clone(),
            content_type: Some(o.content_type.clone()),
        }))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> ExchangeResult<Option<ObjectHead>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(bucket.objects.get(key).map(|o| ObjectHead {
            content_type: Some(o.content_type.clone()),
            content_length: o.body.len() as u64,
        }))
    }

    async fn get_object_tags(
        &self,
        bucket: &str,
        key: &str,
    ) -> ExchangeResult<Option<HashMap<String, String>>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(bucket.objects.get(key).map(|o| o.tags.clone()))
    }

    async fn put_object_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: HashMap<String, String>,
    ) -> ExchangeResult<()> {
        check_tags(&tags)?;
        let mut buckets = self.buckets.write().await;
        let object = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?
            .objects
            .get_mut(key)
            .ok_or_else(|| ExchangeError::object_store(format!("NoSuchKey: {}/{}", bucket, key)))?;
        object.tags = tags;
        self.tag_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> ExchangeResult<()> {
        if self.buckets.read().await.contains_key(bucket) {
            Ok(())
        } else {
            Err(no_such_bucket(bucket))
        }
    }

    async fn get_lifecycle_configuration(
        &self,
        bucket: &str,
    ) -> ExchangeResult<Option<LifecycleConfiguration>> {
        let buckets = self.buckets.read().await;
        let bucket = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(bucket.lifecycle.clone())
    }

    async fn put_lifecycle_configuration(
        &self,
        bucket: &str,
        configuration: &LifecycleConfiguration,
    ) -> ExchangeResult<()> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        bucket.lifecycle = Some(configuration.clone());
        self.lifecycle_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn body(parts: Vec<ExchangeResult<Bytes>>) -> BodyStream {
        Box::pin(stream::iter(parts))
    }

    fn put(key: &str, parts: Vec<ExchangeResult<Bytes>>, length: Option<u64>) -> PutObject {
        PutObject {
            bucket: "partner".to_string(),
            key: key.to_string(),
            body: body(parts),
            content_length: length,
            content_type: "application/xml".to_string(),
            tags: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_put_and_get_object() {
        let backend = InMemoryBlobBackend::with_buckets(&["partner"]);
        backend
            .put_object(put(
                "k1",
                vec![Ok(Bytes::from_static(b"<a>")), Ok(Bytes::from_static(b"</a>"))],
                Some(7),
            ))
            .await
            .unwrap();

        let object = backend.get_object("partner", "k1").await.unwrap().unwrap();
        assert_eq!(&object.body[..], b"<a></a>");
        assert_eq!(object.content_type.as_deref(), Some("application/xml"));
        assert!(backend.get_object("partner", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_body_leaves_no_object() {
        let backend = InMemoryBlobBackend::with_buckets(&["partner"]);
        let result = backend
            .put_object(put(
                "k1",
                vec![
                    Ok(Bytes::from_static(b"<a>")),
                    Err(ExchangeError::validation("broken body")),
                ],
                None,
            ))
            .await;

        assert!(matches!(result, Err(ExchangeError::Validation(_))));
        assert_eq!(backend.object_count("partner").await, 0);
    }

    #[tokio::test]
    async fn test_tag_limit_and_missing_key() {
        let backend = InMemoryBlobBackend::with_buckets(&["partner"]);
        let too_many: HashMap<String, String> =
            (0..11).map(|i| (format!("k{i}"), "v".to_string())).collect();

        let mut request = put("k1", vec![Ok(Bytes::from_static(b"<a/>"))], Some(4));
        request.tags = too_many;
        assert!(backend.put_object(request).await.is_err());

        assert!(backend
            .put_object_tags("partner", "missing", HashMap::new())
            .await
            .is_err());
        assert!(backend.head_bucket("nope").await.is_err());
    }
}
