//! Hand-written fakes for the host interfaces.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::cache::{CacheEntry, CacheStorage, RequestKey};
use crate::clients::{ClientInfo, ClientSignal, Clients};
use crate::http::{Request, Response};
use crate::network::Network;
use crate::push::{NotificationRequest, Notifier};
use crate::retry::Replayer;

/// Network answering from a URL table; unknown URLs get 404.
pub(crate) struct FakeNetwork {
  responses: Mutex<HashMap<String, Response>>,
  online: AtomicBool,
  calls: AtomicUsize,
}

impl Default for FakeNetwork {
  fn default() -> Self {
    Self {
      responses: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      calls: AtomicUsize::new(0),
    }
  }
}

impl FakeNetwork {
  pub(crate) fn respond(&self, url: &str, response: Response) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub(crate) fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  pub(crate) fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if !self.online.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }
    Ok(
      self
        .responses
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| Response::new(404, "text/plain", "not found")),
    )
  }
}

/// Storage that never holds anything and rejects every write.
#[derive(Default)]
pub(crate) struct ReadOnlyStorage;

impl CacheStorage for ReadOnlyStorage {
  fn open_namespace(&self, _namespace: &str) -> Result<()> {
    Err(eyre!("read-only storage"))
  }

  fn list_namespaces(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  fn delete_namespace(&self, _namespace: &str) -> Result<bool> {
    Ok(false)
  }

  fn get_entry(&self, _namespace: &str, _key: &RequestKey) -> Result<Option<CacheEntry>> {
    Ok(None)
  }

  fn put_entry(&self, _namespace: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
    Err(eyre!("read-only storage"))
  }
}

#[derive(Default)]
struct ClientsState {
  windows: Vec<ClientInfo>,
  unreachable: HashSet<String>,
  fail_enumeration: bool,
  fail_navigation: bool,
  messages: Vec<(String, ClientSignal)>,
  navigated: Vec<(String, Url)>,
  focused: Vec<String>,
  opened: Vec<Url>,
}

/// Records every call made against it.
#[derive(Default)]
pub(crate) struct FakeClients {
  state: Mutex<ClientsState>,
}

impl FakeClients {
  pub(crate) fn add_window(&self, id: &str, url: &str, controlled: bool) {
    self.state.lock().unwrap().windows.push(ClientInfo {
      id: id.to_string(),
      url: Url::parse(url).unwrap(),
      controlled,
    });
  }

  pub(crate) fn mark_unreachable(&self, id: &str) {
    self.state.lock().unwrap().unreachable.insert(id.to_string());
  }

  pub(crate) fn fail_enumeration(&self) {
    self.state.lock().unwrap().fail_enumeration = true;
  }

  pub(crate) fn fail_navigation(&self) {
    self.state.lock().unwrap().fail_navigation = true;
  }

  pub(crate) fn messages(&self) -> Vec<(String, ClientSignal)> {
    self.state.lock().unwrap().messages.clone()
  }

  pub(crate) fn navigated(&self) -> Vec<(String, Url)> {
    self.state.lock().unwrap().navigated.clone()
  }

  pub(crate) fn focused(&self) -> Vec<String> {
    self.state.lock().unwrap().focused.clone()
  }

  pub(crate) fn opened(&self) -> Vec<Url> {
    self.state.lock().unwrap().opened.clone()
  }
}

#[async_trait]
impl Clients for FakeClients {
  async fn match_all(&self, include_uncontrolled: bool) -> Result<Vec<ClientInfo>> {
    let state = self.state.lock().unwrap();
    if state.fail_enumeration {
      return Err(eyre!("clients unavailable"));
    }
    Ok(
      state
        .windows
        .iter()
        .filter(|w| include_uncontrolled || w.controlled)
        .cloned()
        .collect(),
    )
  }

  async fn post_message(&self, client_id: &str, signal: &ClientSignal) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    if state.unreachable.contains(client_id) {
      return Err(eyre!("client {} is gone", client_id));
    }
    state.messages.push((client_id.to_string(), signal.clone()));
    Ok(())
  }

  async fn navigate(&self, client_id: &str, url: &Url) -> Result<()> {
    let mut state = self.state.lock().unwrap();
    if state.fail_navigation {
      return Err(eyre!("client {} refused navigation", client_id));
    }
    state.navigated.push((client_id.to_string(), url.clone()));
    Ok(())
  }

  async fn focus(&self, client_id: &str) -> Result<()> {
    self.state.lock().unwrap().focused.push(client_id.to_string());
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    self.state.lock().unwrap().opened.push(url.clone());
    Ok(())
  }
}

/// Notifier that cannot show anything.
pub(crate) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
  async fn show(&self, _request: &NotificationRequest) -> Result<()> {
    Err(eyre!("notification permission denied"))
  }

  async fn close(&self, _tag: &str) -> Result<()> {
    Ok(())
  }
}

/// Replayer that records calls and fails chosen tags.
#[derive(Default)]
pub(crate) struct RecordingReplayer {
  calls: Mutex<Vec<String>>,
  failing: Mutex<HashSet<String>>,
  delay: Option<Duration>,
  tag_delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingReplayer {
  pub(crate) fn with_delay(delay: Duration) -> Self {
    Self {
      delay: Some(delay),
      ..Self::default()
    }
  }

  pub(crate) fn delay_tag(&self, tag: &str, delay: Duration) {
    self.tag_delays.lock().unwrap().insert(tag.to_string(), delay);
  }

  pub(crate) fn fail_tag(&self, tag: &str) {
    self.failing.lock().unwrap().insert(tag.to_string());
  }

  pub(crate) fn heal(&self) {
    self.failing.lock().unwrap().clear();
  }

  pub(crate) fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Replayer for RecordingReplayer {
  async fn replay(&self, tag: &str) -> Result<()> {
    self.calls.lock().unwrap().push(tag.to_string());
    let delay = self.tag_delays.lock().unwrap().get(tag).copied().or(self.delay);
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if self.failing.lock().unwrap().contains(tag) {
      return Err(eyre!("backend rejected {}", tag));
    }
    Ok(())
  }
}
