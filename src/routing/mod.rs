//! Request routing over the cache namespaces.
//!
//! Every intercepted request is classified by an ordered [`RuleSet`] and then
//! served by the matching strategy. Strategies never surface transient
//! network failures: they fall back to cache or to a synthetic response.
//! Only bypassed requests (non-GET, non-HTTP) may fail.

mod fallback;
mod rules;

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::cache::{CacheStorage, CacheStore, RequestKey, Served, VersionManager};
use crate::config::Config;
use crate::http::{Destination, Request, Response, ResponseKind};
use crate::network::Network;

use rules::{RuleSet, Strategy};

/// Executes routing strategies against the cache and the network.
pub struct RoutingEngine<S: CacheStorage> {
  store: CacheStore<S>,
  network: Arc<dyn Network>,
  rules: RuleSet,
  versions: VersionManager,
  origin: Url,
  external_allowlist: Vec<String>,
}

impl<S: CacheStorage> RoutingEngine<S> {
  pub fn new(store: CacheStore<S>, network: Arc<dyn Network>, config: &Config) -> Self {
    Self {
      store,
      network,
      rules: RuleSet::from_config(&config.routing),
      versions: VersionManager::new(config.generation.clone()),
      origin: config.origin.clone(),
      external_allowlist: config.routing.external_allowlist.clone(),
    }
  }

  /// Serve `request`.
  ///
  /// `Ok(None)` means nothing could be produced: the network is unreachable
  /// and no usable cache entry or synthetic fallback exists for this class.
  pub async fn route(&self, request: &Request) -> Result<Option<Served>> {
    let classification = self.rules.classify(request);
    debug!(
      url = %request.url,
      rule = classification.rule,
      strategy = ?classification.strategy,
      "routing request"
    );

    let served = match classification.strategy {
      Strategy::Passthrough => {
        let response = self.network.fetch(request).await?;
        Some(Served::from_network(response))
      }
      Strategy::LiveApi => Some(self.live_api(request).await),
      Strategy::NetworkFirst { root_fallback } => self.network_first(request, root_fallback).await,
      Strategy::CacheFirstAudio => Some(self.cache_first_audio(request).await),
      Strategy::CacheFirst => self.cache_first(request).await,
    };

    Ok(served)
  }

  async fn live_api(&self, request: &Request) -> Served {
    match self.network.fetch(request).await {
      Ok(response) => Served::from_network(response),
      Err(e) => {
        warn!(url = %request.url, error = %e, "live API unreachable, answering offline error");
        Served::synthetic(fallback::offline_api_error())
      }
    }
  }

  async fn network_first(&self, request: &Request, root_fallback: bool) -> Option<Served> {
    let key = self.key(request);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_dynamic(&key, &response);
        }
        Some(Served::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed, trying cache");

        if let Some(entry) = self.store.match_any(&self.versions.current_names(), &key) {
          return Some(Served::from_cache(entry));
        }

        if root_fallback {
          let root = RequestKey::root_document(&self.origin);
          if let Some(entry) = self.store.match_any(&self.versions.current_names(), &root) {
            return Some(Served::from_cache(entry));
          }
        }

        warn!(url = %request.url, "offline and nothing cached");
        None
      }
    }
  }

  async fn cache_first_audio(&self, request: &Request) -> Served {
    let key = self.key(request);

    if let Some(entry) = self.store.match_any(&self.versions.current_names(), &key) {
      return Served::from_cache(entry);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_ok() {
          self.store_dynamic(&key, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "audio unavailable offline");
        Served::synthetic(fallback::audio_unavailable())
      }
    }
  }

  async fn cache_first(&self, request: &Request) -> Option<Served> {
    let key = self.key(request);

    if let Some(entry) = self.store.match_any(&self.versions.current_names(), &key) {
      return Some(Served::from_cache(entry));
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        let basic_success = response.is_ok() && response.kind == ResponseKind::Basic;
        let allowlisted = rules::matches_prefix(&self.external_allowlist, request.url.as_str());
        if basic_success || allowlisted {
          self.store_dynamic(&key, &response);
        }
        Some(Served::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network failed and nothing cached");
        if request.destination == Destination::Image {
          Some(Served::synthetic(fallback::offline_image()))
        } else {
          None
        }
      }
    }
  }

  fn key(&self, request: &Request) -> RequestKey {
    RequestKey::for_request(request, &self.origin)
  }

  fn store_dynamic(&self, key: &RequestKey, response: &Response) {
    self
      .store
      .handle(&self.versions.dynamic_name())
      .put_best_effort(key, response);
  }
}
