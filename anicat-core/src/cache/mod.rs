//! In-memory TTL caching.
//!
//! [`TtlCache`] is the process-local store used for catalog pages and meta
//! records. [`CacheSnapshotStore`] is a typed facade around `cacache` that
//! persists live entries across restarts as a warm-start optimization.

pub mod snapshot;
pub mod store;

pub use snapshot::*;
pub use store::*;
