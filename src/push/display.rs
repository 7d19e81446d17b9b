//! Notification display API and an in-memory notification center.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;

use super::payload::NotificationDescriptor;

/// Everything the host needs to show a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
  pub descriptor: NotificationDescriptor,
  /// Alert again even though a notification with this tag is replaced
  pub renotify: bool,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
}

/// Host notification API.
#[async_trait]
pub trait Notifier: Send + Sync {
  /// Show a notification, replacing any displayed one with the same tag.
  async fn show(&self, request: &NotificationRequest) -> Result<()>;

  /// Close the notification with `tag`. Closing a closed one is a no-op.
  async fn close(&self, tag: &str) -> Result<()>;
}

/// Keeps displayed notifications in memory, at most one per tag.
#[derive(Debug, Default)]
pub struct NotificationCenter {
  displayed: Mutex<Vec<NotificationRequest>>,
}

impl NotificationCenter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of displayed notifications, oldest first.
  pub fn displayed(&self) -> Vec<NotificationRequest> {
    self
      .displayed
      .lock()
      .map(|d| d.clone())
      .unwrap_or_default()
  }

  fn with_displayed<T>(&self, f: impl FnOnce(&mut Vec<NotificationRequest>) -> T) -> Result<T> {
    let mut displayed = self
      .displayed
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(f(&mut displayed))
  }
}

#[async_trait]
impl Notifier for NotificationCenter {
  async fn show(&self, request: &NotificationRequest) -> Result<()> {
    self.with_displayed(|displayed| {
      displayed.retain(|n| n.descriptor.tag != request.descriptor.tag);
      displayed.push(request.clone());
    })
  }

  async fn close(&self, tag: &str) -> Result<()> {
    self.with_displayed(|displayed| displayed.retain(|n| n.descriptor.tag != tag))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::NotificationConfig;

  fn request(tag: &str, body: &str) -> NotificationRequest {
    let mut descriptor = NotificationDescriptor::with_body(body, &NotificationConfig::default());
    descriptor.tag = tag.to_string();
    NotificationRequest {
      descriptor,
      renotify: false,
      vibrate: Vec::new(),
    }
  }

  #[tokio::test]
  async fn test_same_tag_replaces() {
    let center = NotificationCenter::new();
    center.show(&request("due", "first")).await.unwrap();
    center.show(&request("other", "x")).await.unwrap();
    center.show(&request("due", "second")).await.unwrap();

    let displayed = center.displayed();
    assert_eq!(displayed.len(), 2);
    assert_eq!(displayed[1].descriptor.body, "second");
  }

  #[tokio::test]
  async fn test_close_is_idempotent() {
    let center = NotificationCenter::new();
    center.show(&request("due", "x")).await.unwrap();

    center.close("due").await.unwrap();
    center.close("due").await.unwrap();

    assert!(center.displayed().is_empty());
  }
}
