//! Push message handling: parse, display, and wake open instances.

mod display;
mod payload;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::clients::{broadcast, ClientSignal, Clients};
use crate::config::NotificationConfig;

pub use display::{NotificationCenter, NotificationRequest, Notifier};
pub use payload::{parse_payload, NotificationAction, NotificationDescriptor, DISMISS_ACTION};

/// What happened to one delivered push message.
#[derive(Debug, Clone)]
pub struct PushReport {
  pub descriptor: NotificationDescriptor,
  /// Whether the notification was shown
  pub displayed: bool,
  /// Number of instances that received the sound signal
  pub signalled: usize,
}

/// Turns delivered payloads into notifications and client signals.
pub struct PushPipeline {
  notifier: Arc<dyn Notifier>,
  clients: Arc<dyn Clients>,
  defaults: NotificationConfig,
  /// Tags displayed at least once; later messages with these tags re-notify
  seen_tags: Mutex<HashSet<String>>,
}

impl PushPipeline {
  pub fn new(
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
    defaults: NotificationConfig,
  ) -> Self {
    Self {
      notifier,
      clients,
      defaults,
      seen_tags: Mutex::new(HashSet::new()),
    }
  }

  /// Handle one delivered message.
  ///
  /// Display and broadcast run concurrently; either may fail without
  /// affecting the other.
  pub async fn on_push(&self, payload: &[u8]) -> PushReport {
    let descriptor = parse_payload(payload, &self.defaults);
    let request = NotificationRequest {
      renotify: self.was_seen(&descriptor.tag),
      vibrate: self.defaults.vibrate.clone(),
      descriptor,
    };

    let show = async {
      match self.notifier.show(&request).await {
        Ok(()) => {
          self.mark_seen(&request.descriptor.tag);
          true
        }
        Err(e) => {
          warn!(tag = %request.descriptor.tag, error = %e, "failed to show notification");
          false
        }
      }
    };
    let signal = broadcast(self.clients.as_ref(), &ClientSignal::PlayNotificationSound);

    let (displayed, signalled) = futures::join!(show, signal);

    info!(
      tag = %request.descriptor.tag,
      renotify = request.renotify,
      displayed,
      signalled,
      "handled push message"
    );

    PushReport {
      descriptor: request.descriptor,
      displayed,
      signalled,
    }
  }

  /// True if a notification with `tag` was displayed before.
  fn was_seen(&self, tag: &str) -> bool {
    match self.seen_tags.lock() {
      Ok(seen) => seen.contains(tag),
      // A poisoned set only loses the re-notify hint; same-tag replacement still holds
      Err(_) => true,
    }
  }

  fn mark_seen(&self, tag: &str) {
    if let Ok(mut seen) = self.seen_tags.lock() {
      seen.insert(tag.to_string());
    }
  }
}
