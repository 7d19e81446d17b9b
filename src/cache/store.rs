//! Namespace handles over a cache storage backend.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use super::storage::CacheStorage;
use super::traits::{CacheEntry, RequestKey};
use crate::http::Response;

/// Entry point to the cache namespaces.
///
/// Holds no policy: callers decide what to read and write, this type only
/// scopes operations to a namespace and keeps storage errors from leaking
/// into best-effort paths.
pub struct CacheStore<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheStore<S> {
  pub fn new(storage: Arc<S>) -> Self {
    Self { storage }
  }

  /// Open (creating if needed) a namespace handle.
  pub fn open(&self, name: &str) -> Result<Namespace<S>> {
    self.storage.open_namespace(name)?;
    Ok(self.handle(name))
  }

  /// A handle that creates the namespace lazily on first write.
  pub fn handle(&self, name: &str) -> Namespace<S> {
    Namespace {
      name: name.to_string(),
      storage: Arc::clone(&self.storage),
    }
  }

  pub fn list_namespaces(&self) -> Result<Vec<String>> {
    self.storage.list_namespaces()
  }

  pub fn delete_namespace(&self, name: &str) -> Result<bool> {
    self.storage.delete_namespace(name)
  }

  /// Most recently stored entry for `key` across `names`.
  ///
  /// Equal timestamps go to the later namespace in `names`. A failing read
  /// is logged and treated as a miss.
  pub fn match_any(&self, names: &[String], key: &RequestKey) -> Option<CacheEntry> {
    names
      .iter()
      .filter_map(|name| match self.storage.get_entry(name, key) {
        Ok(entry) => entry,
        Err(e) => {
          warn!(namespace = %name, key = %key, error = %e, "cache read failed");
          None
        }
      })
      .fold(None, |newest: Option<CacheEntry>, entry| match newest {
        Some(current) if current.stored_at > entry.stored_at => Some(current),
        _ => Some(entry),
      })
  }
}

impl<S: CacheStorage> Clone for CacheStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// A single named, versioned namespace.
pub struct Namespace<S: CacheStorage> {
  name: String,
  storage: Arc<S>,
}

impl<S: CacheStorage> Namespace<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn match_key(&self, key: &RequestKey) -> Result<Option<CacheEntry>> {
    self.storage.get_entry(&self.name, key)
  }

  pub fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
    self.storage.put_entry(&self.name, key, response)
  }

  /// Store `response`, logging instead of failing.
  ///
  /// Returns whether the write landed.
  pub fn put_best_effort(&self, key: &RequestKey, response: &Response) -> bool {
    match self.put(key, response) {
      Ok(()) => {
        debug!(namespace = %self.name, key = %key, "cached response");
        true
      }
      Err(e) => {
        warn!(namespace = %self.name, key = %key, error = %e, "cache write failed");
        false
      }
    }
  }
}
