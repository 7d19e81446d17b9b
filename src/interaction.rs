//! Routing of clicks and dismissals on displayed notifications.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::clients::Clients;
use crate::push::{NotificationDescriptor, Notifier, DISMISS_ACTION};

/// A click on a displayed notification or one of its actions.
#[derive(Debug, Clone)]
pub struct NotificationClick {
  pub notification: NotificationDescriptor,
  /// Clicked action id; `None` for a click on the notification body
  pub action: Option<String>,
}

/// Terminal state reached by a click.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// The dismiss action was chosen; nothing was opened or focused
  Dismissed,
  /// An existing same-origin instance was navigated and focused
  Focused { client_id: String, url: Url },
  /// No same-origin instance was open, a new one was opened
  Opened { url: Url },
}

pub struct InteractionDispatcher {
  origin: Url,
  notifier: Arc<dyn Notifier>,
  clients: Arc<dyn Clients>,
}

impl InteractionDispatcher {
  pub fn new(origin: Url, notifier: Arc<dyn Notifier>, clients: Arc<dyn Clients>) -> Self {
    Self {
      origin,
      notifier,
      clients,
    }
  }

  pub async fn on_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    let tag = &click.notification.tag;
    if let Err(e) = self.notifier.close(tag).await {
      warn!(tag = %tag, error = %e, "failed to close clicked notification");
    }

    if click.action.as_deref() == Some(DISMISS_ACTION) {
      debug!(tag = %tag, "notification dismissed from action");
      return Ok(ClickOutcome::Dismissed);
    }

    let target = self.resolve_target(click)?;

    let windows = self.clients.match_all(true).await?;
    let existing = windows
      .iter()
      .find(|client| client.url.origin() == self.origin.origin());

    match existing {
      Some(client) => {
        if let Err(e) = self.clients.navigate(&client.id, &target).await {
          warn!(client = %client.id, url = %target, error = %e, "failed to navigate instance");
        }
        self.clients.focus(&client.id).await?;
        info!(client = %client.id, url = %target, "focused existing instance");
        Ok(ClickOutcome::Focused {
          client_id: client.id.clone(),
          url: target,
        })
      }
      None => {
        self.clients.open_window(&target).await?;
        info!(url = %target, "opened new instance");
        Ok(ClickOutcome::Opened { url: target })
      }
    }
  }

  /// The user closed the notification. Nothing else happens.
  pub fn on_close(&self, tag: &str) {
    debug!(tag = %tag, "notification closed by user");
  }

  /// Action override, else the notification target, else `/`.
  fn resolve_target(&self, click: &NotificationClick) -> Result<Url> {
    let action_url = click
      .action
      .as_deref()
      .and_then(|id| click.notification.action(id))
      .and_then(|action| action.url.as_deref())
      .filter(|url| !url.trim().is_empty());
    let notification_url = Some(click.notification.target_url.as_str()).filter(|url| !url.trim().is_empty());

    let target = action_url.or(notification_url).unwrap_or("/");

    self
      .origin
      .join(target)
      .map_err(|e| eyre!("Invalid notification target {}: {}", target, e))
  }
}
