//! Ingestion-consistency pipeline of a B2B message exchange.
//!
//! Partner and internal messages are validated as XML while they stream
//! into object storage, tracked through malware scanning with object tags,
//! announced over Kafka and, for internal messages, appended to an ordered
//! log that partners page through.

pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod exchange;
pub mod housekeeping;
pub mod message_log;
pub mod metrics;
pub mod object_store;
pub mod scan;
pub mod xml;

pub use context::{ExchangeContext, StorageBackends};
pub use error::{ExchangeError, ExchangeResult};
pub use exchange::{ExchangeState, MessageExchangeService};
