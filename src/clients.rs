//! Open application instances and the signals broadcast to them.

use async_trait::async_trait;
use color_eyre::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Fire-and-forget message for application instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientSignal {
  /// Play the local notification sound.
  PlayNotificationSound,
  /// Replay the offline mutation recorded under `tag`.
  ReplayRequested { tag: String },
}

/// An open application window as enumerated by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
  pub id: String,
  pub url: Url,
  /// Whether the agent currently controls this instance
  pub controlled: bool,
}

/// Host API over open application instances.
///
/// Instances are enumerated fresh for every event; no identity is kept
/// across events.
#[async_trait]
pub trait Clients: Send + Sync {
  /// Every reachable instance, optionally including uncontrolled ones.
  async fn match_all(&self, include_uncontrolled: bool) -> Result<Vec<ClientInfo>>;

  async fn post_message(&self, client_id: &str, signal: &ClientSignal) -> Result<()>;

  async fn navigate(&self, client_id: &str, url: &Url) -> Result<()>;

  async fn focus(&self, client_id: &str) -> Result<()>;

  async fn open_window(&self, url: &Url) -> Result<()>;
}

/// Send `signal` to every reachable instance, uncontrolled ones included.
///
/// Unreachable instances are skipped. Returns how many received it.
pub async fn broadcast(clients: &dyn Clients, signal: &ClientSignal) -> usize {
  let instances = match clients.match_all(true).await {
    Ok(instances) => instances,
    Err(e) => {
      warn!(error = %e, "could not enumerate clients for broadcast");
      return 0;
    }
  };

  let deliveries = instances.iter().map(|client| async move {
    match clients.post_message(&client.id, signal).await {
      Ok(()) => true,
      Err(e) => {
        debug!(client = %client.id, error = %e, "skipping unreachable client");
        false
      }
    }
  });

  let delivered = join_all(deliveries).await.into_iter().filter(|ok| *ok).count();
  debug!(?signal, delivered, total = instances.len(), "broadcast signal");
  delivered
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::FakeClients;

  #[tokio::test]
  async fn test_broadcast_reaches_uncontrolled_and_skips_closed() {
    let clients = FakeClients::default();
    clients.add_window("a", "https://app.test/", true);
    clients.add_window("b", "https://app.test/calendar", false);
    clients.add_window("closed", "https://app.test/", true);
    clients.mark_unreachable("closed");

    let delivered = broadcast(&clients, &ClientSignal::PlayNotificationSound).await;

    assert_eq!(delivered, 2);
    let messages = clients.messages();
    assert!(messages.contains(&("a".to_string(), ClientSignal::PlayNotificationSound)));
    assert!(messages.contains(&("b".to_string(), ClientSignal::PlayNotificationSound)));
  }

  #[tokio::test]
  async fn test_broadcast_with_no_clients() {
    let clients = FakeClients::default();
    assert_eq!(
      broadcast(&clients, &ClientSignal::PlayNotificationSound).await,
      0
    );
  }

  #[test]
  fn test_signal_wire_format() {
    let json = serde_json::to_value(ClientSignal::PlayNotificationSound).unwrap();
    assert_eq!(json, serde_json::json!({ "type": "play-notification-sound" }));

    let json = serde_json::to_value(ClientSignal::ReplayRequested {
      tag: "sync-tasks".to_string(),
    })
    .unwrap();
    assert_eq!(
      json,
      serde_json::json!({ "type": "replay-requested", "tag": "sync-tasks" })
    );
  }
}
