//! Payload storage in two buckets (internal and partner origin), with scan
//! status kept as object tags and expiry driven by a bucket lifecycle rule.

pub mod adapter;
pub mod backend;
pub mod lifecycle;
pub mod tags;

pub use adapter::{
    BucketStore, BucketType, FallbackObjectStore, LoadedMessage, MessageContent, ObjectStore,
    ReadOnlyBuckets,
};
pub use backend::{BlobBackend, BodyStream, InMemoryBlobBackend, PutObject};
pub use lifecycle::{LifecyclePolicy, LifecyclePolicyInstaller};
pub use tags::{ScanStatus, ScanStatusTags, ValidatedScanTags};
