//! The interception agent: owns every component and dispatches events.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::{CacheStorage, CacheStore, CleanupReport, RequestKey, Served, VersionManager};
use crate::clients::Clients;
use crate::config::Config;
use crate::event::{AgentEvent, EventHandler};
use crate::http::Request;
use crate::interaction::{ClickOutcome, InteractionDispatcher, NotificationClick};
use crate::network::Network;
use crate::push::{Notifier, PushPipeline, PushReport};
use crate::retry::{Replayer, RetryQueue, RetryStore, SyncReport};
use crate::routing::RoutingEngine;

/// What happened during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// App-shell paths stored in the static namespace
  pub precached: Vec<String>,
  /// App-shell paths that could not be fetched
  pub precache_failed: Vec<String>,
  pub cleanup: CleanupReport,
}

/// Host services the agent calls out to.
pub struct Host {
  pub network: Arc<dyn Network>,
  pub notifier: Arc<dyn Notifier>,
  pub clients: Arc<dyn Clients>,
  pub replayer: Arc<dyn Replayer>,
}

struct Inner<S: CacheStorage + RetryStore> {
  config: Config,
  store: CacheStore<S>,
  network: Arc<dyn Network>,
  versions: VersionManager,
  router: RoutingEngine<S>,
  push: PushPipeline,
  interactions: InteractionDispatcher,
  retry: RetryQueue<S>,
  activation: OnceCell<ActivationReport>,
}

/// Cheap to clone; clones share all state.
pub struct Agent<S: CacheStorage + RetryStore> {
  inner: Arc<Inner<S>>,
}

impl<S: CacheStorage + RetryStore> Clone for Agent<S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<S: CacheStorage + RetryStore + 'static> Agent<S> {
  pub fn new(config: Config, storage: Arc<S>, host: Host) -> Self {
    let store = CacheStore::new(Arc::clone(&storage));
    let router = RoutingEngine::new(store.clone(), Arc::clone(&host.network), &config);
    let push = PushPipeline::new(
      Arc::clone(&host.notifier),
      Arc::clone(&host.clients),
      config.notifications.clone(),
    );
    let interactions =
      InteractionDispatcher::new(config.origin.clone(), host.notifier, host.clients);
    let retry = RetryQueue::new(storage, host.replayer);

    Self {
      inner: Arc::new(Inner {
        versions: VersionManager::new(config.generation.clone()),
        config,
        store,
        network: host.network,
        router,
        push,
        interactions,
        retry,
        activation: OnceCell::new(),
      }),
    }
  }

  /// Precache the app shell and purge stale namespaces, once.
  ///
  /// Every request waits for this, so no stale entry is ever served.
  pub async fn activate(&self) -> ActivationReport {
    self
      .inner
      .activation
      .get_or_init(|| async {
        let (precached, precache_failed) = self.install().await;
        let cleanup = self.inner.versions.cleanup(&self.inner.store);
        info!(
          generation = self.inner.versions.generation(),
          precached = precached.len(),
          removed = cleanup.removed.len(),
          "agent activated"
        );
        ActivationReport {
          precached,
          precache_failed,
          cleanup,
        }
      })
      .await
      .clone()
  }

  async fn install(&self) -> (Vec<String>, Vec<String>) {
    let config = &self.inner.config;
    let static_ns = match self.inner.store.open(&self.inner.versions.static_name()) {
      Ok(ns) => ns,
      Err(e) => {
        warn!(error = %e, "could not open static namespace, skipping precache");
        return (Vec::new(), config.precache.clone());
      }
    };
    let mut stored = Vec::new();
    let mut failed = Vec::new();

    for path in &config.precache {
      let url = match config.origin.join(path) {
        Ok(url) => url,
        Err(e) => {
          warn!(path = %path, error = %e, "invalid precache path");
          failed.push(path.clone());
          continue;
        }
      };

      let request = Request::get(url);
      match self.inner.network.fetch(&request).await {
        Ok(response) if response.is_ok() => {
          let key = RequestKey::for_request(&request, &config.origin);
          if static_ns.put_best_effort(&key, &response) {
            stored.push(path.clone());
          } else {
            failed.push(path.clone());
          }
        }
        Ok(response) => {
          warn!(path = %path, status = response.status, "precache got error status");
          failed.push(path.clone());
        }
        Err(e) => {
          warn!(path = %path, error = %e, "precache fetch failed");
          failed.push(path.clone());
        }
      }
    }

    (stored, failed)
  }

  pub async fn fetch(&self, request: &Request) -> Result<Option<Served>> {
    self.activate().await;
    self.inner.router.route(request).await
  }

  pub async fn push(&self, payload: &[u8]) -> PushReport {
    self.inner.push.on_push(payload).await
  }

  pub async fn click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    self.inner.interactions.on_click(click).await
  }

  pub fn close(&self, tag: &str) {
    self.inner.interactions.on_close(tag);
  }

  pub fn enqueue(&self, tag: &str) -> Result<bool> {
    self.inner.retry.enqueue(tag)
  }

  pub async fn connectivity_restored(&self) -> Result<SyncReport> {
    self.inner.retry.on_reconnect().await
  }

  /// Handle one event and send its outcome back.
  pub async fn handle(&self, event: AgentEvent) {
    // A dropped receiver only means the host stopped waiting
    match event {
      AgentEvent::Activate { reply } => {
        let _ = reply.send(self.activate().await);
      }
      AgentEvent::Fetch { request, reply } => {
        let _ = reply.send(self.fetch(&request).await);
      }
      AgentEvent::Push { payload, reply } => {
        let _ = reply.send(self.push(&payload).await);
      }
      AgentEvent::NotificationClick { click, reply } => {
        let outcome = self.click(&click).await;
        if let Err(e) = &outcome {
          warn!(tag = %click.notification.tag, error = %e, "notification click failed");
        }
        let _ = reply.send(outcome);
      }
      AgentEvent::NotificationClose { tag, reply } => {
        self.close(&tag);
        let _ = reply.send(());
      }
      AgentEvent::Enqueue { tag, reply } => {
        let _ = reply.send(self.enqueue(&tag));
      }
      AgentEvent::ConnectivityRestored { reply } => {
        let _ = reply.send(self.connectivity_restored().await);
      }
    }
  }

  /// Process events until every sender is dropped.
  ///
  /// Each event runs in its own task; the loop waits for all of them
  /// before returning.
  pub async fn run(self, mut events: EventHandler) {
    let mut tasks = JoinSet::new();

    while let Some(event) = events.next().await {
      let agent = self.clone();
      tasks.spawn(async move { agent.handle(event).await });
    }

    while let Some(result) = tasks.join_next().await {
      if let Err(e) = result {
        warn!(error = %e, "event task panicked");
      }
    }
    debug!("event loop finished");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{ResponseSource, SqliteStorage};
  use crate::event;
  use crate::http::{RequestMode, Response};
  use crate::push::NotificationCenter;
  use crate::test_support::{FakeClients, FakeNetwork, RecordingReplayer};
  use url::Url;

  struct Harness {
    agent: Agent<SqliteStorage>,
    storage: Arc<SqliteStorage>,
    network: Arc<FakeNetwork>,
    center: Arc<NotificationCenter>,
    clients: Arc<FakeClients>,
    replayer: Arc<RecordingReplayer>,
  }

  fn harness() -> Harness {
    let config = Config::from_yaml(
      r#"
origin: "https://app.test"
generation: v5
precache: ["/", "/manifest.json"]
"#,
    )
    .unwrap();
    let storage = Arc::new(SqliteStorage::in_memory().unwrap());
    let network = Arc::new(FakeNetwork::default());
    let center = Arc::new(NotificationCenter::new());
    let clients = Arc::new(FakeClients::default());
    let replayer = Arc::new(RecordingReplayer::default());
    let agent = Agent::new(
      config,
      storage.clone(),
      Host {
        network: network.clone(),
        notifier: center.clone(),
        clients: clients.clone(),
        replayer: replayer.clone(),
      },
    );
    Harness {
      agent,
      storage,
      network,
      center,
      clients,
      replayer,
    }
  }

  #[tokio::test]
  async fn test_activation_precaches_and_purges_old_generation() {
    let h = harness();
    h.storage.open_namespace("static-v4").unwrap();
    h.storage.open_namespace("dynamic-v4").unwrap();
    h.network
      .respond("https://app.test/", Response::new(200, "text/html", "shell"));

    let report = h.agent.activate().await;

    assert_eq!(report.precached, vec!["/"]);
    assert_eq!(report.precache_failed, vec!["/manifest.json"]);
    let mut removed = report.cleanup.removed.clone();
    removed.sort();
    assert_eq!(removed, vec!["dynamic-v4", "static-v4"]);
    assert_eq!(h.storage.list_namespaces().unwrap(), vec!["static-v5"]);
  }

  #[tokio::test]
  async fn test_activation_runs_once() {
    let h = harness();
    h.agent.activate().await;
    let calls = h.network.calls();

    h.agent.activate().await;
    h.agent
      .fetch(&Request::parse_get("https://app.test/manifest.json").unwrap())
      .await
      .unwrap();

    assert_eq!(h.network.calls(), calls + 1);
  }

  #[tokio::test]
  async fn test_offline_activation_still_serves() {
    let h = harness();
    h.network.set_online(false);

    let report = h.agent.activate().await;
    assert!(report.precached.is_empty());

    let served = h
      .agent
      .fetch(&Request::parse_get("https://api.other.test/x").unwrap())
      .await
      .unwrap();
    assert!(served.is_none());
  }

  #[tokio::test]
  async fn test_first_fetch_activates_before_routing() {
    let h = harness();
    let stale = RequestKey::for_request(
      &Request::parse_get("https://app.test/calendar").unwrap(),
      &Url::parse("https://app.test").unwrap(),
    );
    h.storage
      .put_entry("dynamic-v4", &stale, &Response::new(200, "text/html", "old"))
      .unwrap();
    h.network.set_online(false);

    let request = Request::parse_get("https://app.test/calendar")
      .unwrap()
      .with_mode(RequestMode::Navigate);
    let served = h.agent.fetch(&request).await.unwrap();

    // Offline from the start: nothing precached and the v4 entry is gone
    assert!(served.is_none());
    assert!(!h
      .storage
      .list_namespaces()
      .unwrap()
      .contains(&"dynamic-v4".to_string()));
  }

  #[tokio::test]
  async fn test_precached_shell_serves_offline_navigation() {
    let h = harness();
    h.network
      .respond("https://app.test/", Response::new(200, "text/html", "shell"));
    h.agent.activate().await;
    h.network.set_online(false);

    let request = Request::parse_get("https://app.test/decks/42")
      .unwrap()
      .with_mode(RequestMode::Navigate);
    let served = h.agent.fetch(&request).await.unwrap().unwrap();

    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, b"shell");
  }

  #[tokio::test]
  async fn test_event_loop_round_trip() {
    let h = harness();
    h.clients.add_window("w1", "https://app.test/", true);
    let (handle, events) = event::channel();
    let runner = tokio::spawn(h.agent.clone().run(events));

    let report = handle.push(br#"{"body": "due", "tag": "due"}"#.to_vec()).await.unwrap();
    assert!(report.displayed);

    let outcome = handle
      .click(NotificationClick {
        notification: report.descriptor.clone(),
        action: None,
      })
      .await
      .unwrap();
    assert!(matches!(outcome, ClickOutcome::Focused { .. }));
    assert!(h.center.displayed().is_empty());

    handle.close("due".to_string()).await.unwrap();

    assert!(handle.enqueue("sync-tasks".to_string()).await.unwrap());
    assert!(!handle.enqueue("sync-tasks".to_string()).await.unwrap());
    let sync = handle.connectivity_restored().await.unwrap();
    assert_eq!(sync.replayed, vec!["sync-tasks"]);
    assert_eq!(h.replayer.calls(), vec!["sync-tasks"]);

    drop(handle);
    runner.await.unwrap();
  }

  #[tokio::test]
  async fn test_concurrent_fetches_through_event_loop() {
    let h = harness();
    h.network.respond(
      "https://app.test/a.json",
      Response::new(200, "application/json", "a"),
    );
    h.network.respond(
      "https://app.test/b.json",
      Response::new(200, "application/json", "b"),
    );
    let (handle, events) = event::channel();
    let runner = tokio::spawn(h.agent.clone().run(events));

    let (a, b) = tokio::join!(
      handle.fetch(Request::parse_get("https://app.test/a.json").unwrap()),
      handle.fetch(Request::parse_get("https://app.test/b.json").unwrap()),
    );

    assert_eq!(a.unwrap().unwrap().response.body, b"a");
    assert_eq!(b.unwrap().unwrap().response.body, b"b");

    drop(handle);
    runner.await.unwrap();
  }
}
