//! Versioned cache namespaces for offline support.
//!
//! This module provides the storage side of the agent:
//! - Named namespaces whose names embed a generation tag
//! - Entries keyed by canonical request identity, replaced wholesale on write
//! - Cleanup of namespaces left behind by previous generations
//!
//! It holds no routing policy; see `crate::routing` for that.

mod storage;
mod store;
mod traits;
mod version;

pub use storage::{CacheStorage, SqliteStorage};
pub use store::CacheStore;
pub use traits::{CacheEntry, RequestKey, ResponseSource, Served};
pub use version::{CleanupReport, VersionManager};

pub(crate) use storage::parse_datetime;
