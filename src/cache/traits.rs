//! Core types for the caching system.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Destination, Request, Response};

/// Canonical identity of a request inside a cache namespace.
///
/// Same-origin requests are keyed by method and absolute URL. Cross-origin
/// static assets (audio, images, styles, fonts) are keyed by URL alone so
/// they can be matched regardless of how the asset was requested. Fragments
/// never take part in the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  identity: String,
}

impl RequestKey {
  pub fn for_request(request: &Request, origin: &Url) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);

    let url_only = !request.is_same_origin(origin)
      && matches!(
        request.destination,
        Destination::Audio | Destination::Image | Destination::Style | Destination::Font
      );

    let identity = if url_only {
      url.to_string()
    } else {
      format!("{} {}", request.method.to_ascii_uppercase(), url)
    };

    Self { identity }
  }

  /// Key of the root document of `origin`.
  pub fn root_document(origin: &Url) -> Self {
    let mut url = origin.clone();
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Self::for_request(&Request::get(url), origin)
  }

  /// Human-readable identity, e.g. `GET https://app.test/index.html`.
  pub fn identity(&self) -> &str {
    &self.identity
  }

  /// SHA256 hash for stable, fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.identity.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.identity)
  }
}

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub response: Response,
  /// When the entry was written
  pub stored_at: DateTime<Utc>,
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh response from the network
  Network,
  /// Served from a cache namespace
  Cache,
  /// Built locally because neither network nor cache could answer
  Synthetic,
}

/// A response together with its provenance.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
  /// When the response was cached (if from cache)
  pub stored_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      stored_at: None,
    }
  }

  pub fn from_cache(entry: CacheEntry) -> Self {
    Self {
      response: entry.response,
      source: ResponseSource::Cache,
      stored_at: Some(entry.stored_at),
    }
  }

  pub fn synthetic(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Synthetic,
      stored_at: None,
    }
  }
}
