//! Generation tracking and stale namespace cleanup.

use tracing::{info, warn};

use super::storage::CacheStorage;
use super::store::CacheStore;

/// Logical name of the precached app-shell namespace.
pub const STATIC_NAMESPACE: &str = "static";
/// Logical name of the runtime-populated namespace.
pub const DYNAMIC_NAMESPACE: &str = "dynamic";

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
  /// Namespaces that were deleted
  pub removed: Vec<String>,
  /// Namespaces whose deletion failed, with the error message
  pub failed: Vec<(String, String)>,
}

/// Knows the current generation and which namespaces belong to it.
#[derive(Debug, Clone)]
pub struct VersionManager {
  generation: String,
}

impl VersionManager {
  pub fn new(generation: impl Into<String>) -> Self {
    Self {
      generation: generation.into(),
    }
  }

  pub fn generation(&self) -> &str {
    &self.generation
  }

  pub fn static_name(&self) -> String {
    format!("{}-{}", STATIC_NAMESPACE, self.generation)
  }

  pub fn dynamic_name(&self) -> String {
    format!("{}-{}", DYNAMIC_NAMESPACE, self.generation)
  }

  /// Current namespace names. On equal timestamps the later name wins a lookup.
  pub fn current_names(&self) -> Vec<String> {
    vec![self.static_name(), self.dynamic_name()]
  }

  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name() || name == self.dynamic_name()
  }

  /// Delete every namespace that does not belong to the current generation.
  ///
  /// Failures are collected, never returned: one bad namespace must not keep
  /// the others around or hold up readiness.
  pub fn cleanup<S: CacheStorage>(&self, store: &CacheStore<S>) -> CleanupReport {
    let mut report = CleanupReport::default();

    let names = match store.list_namespaces() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "could not enumerate cache namespaces");
        return report;
      }
    };

    for name in names.into_iter().filter(|n| !self.is_current(n)) {
      match store.delete_namespace(&name) {
        Ok(_) => {
          info!(namespace = %name, "removed stale cache namespace");
          report.removed.push(name);
        }
        Err(e) => {
          warn!(namespace = %name, error = %e, "failed to remove stale cache namespace");
          report.failed.push((name, e.to_string()));
        }
      }
    }

    report
  }
}
