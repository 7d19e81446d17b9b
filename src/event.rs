use color_eyre::{eyre::eyre, Result};
use tokio::sync::{mpsc, oneshot};

use crate::agent::ActivationReport;
use crate::cache::Served;
use crate::http::Request;
use crate::interaction::{ClickOutcome, NotificationClick};
use crate::push::PushReport;
use crate::retry::SyncReport;

/// Events delivered to the agent by the host
#[derive(Debug)]
pub enum AgentEvent {
  /// Run activation now instead of on the first request
  Activate {
    reply: oneshot::Sender<ActivationReport>,
  },
  /// An intercepted outbound request
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<Option<Served>>>,
  },
  /// A delivered push message
  Push {
    payload: Vec<u8>,
    reply: oneshot::Sender<PushReport>,
  },
  /// A click on a notification or one of its actions
  NotificationClick {
    click: NotificationClick,
    reply: oneshot::Sender<Result<ClickOutcome>>,
  },
  /// A notification closed by the user
  NotificationClose {
    tag: String,
    reply: oneshot::Sender<()>,
  },
  /// The application recorded an offline mutation
  Enqueue {
    tag: String,
    reply: oneshot::Sender<Result<bool>>,
  },
  /// Connectivity came back
  ConnectivityRestored {
    reply: oneshot::Sender<Result<SyncReport>>,
  },
}

/// Receiving end consumed by the agent's run loop
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<AgentEvent>,
}

impl EventHandler {
  /// Receive the next event; `None` once every sender is gone
  pub async fn next(&mut self) -> Option<AgentEvent> {
    self.rx.recv().await
  }
}

/// Sending end used by the host to deliver events and await outcomes
#[derive(Clone)]
pub struct AgentHandle {
  tx: mpsc::UnboundedSender<AgentEvent>,
}

/// Create a connected handle and event handler
pub fn channel() -> (AgentHandle, EventHandler) {
  let (tx, rx) = mpsc::unbounded_channel();
  (AgentHandle { tx }, EventHandler { rx })
}

impl AgentHandle {
  async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AgentEvent) -> Result<T> {
    let (reply, response) = oneshot::channel();
    self
      .tx
      .send(make(reply))
      .map_err(|_| eyre!("Agent is not running"))?;
    response
      .await
      .map_err(|_| eyre!("Agent dropped the event without answering"))
  }

  pub async fn activate(&self) -> Result<ActivationReport> {
    self.call(|reply| AgentEvent::Activate { reply }).await
  }

  pub async fn fetch(&self, request: Request) -> Result<Option<Served>> {
    self
      .call(|reply| AgentEvent::Fetch { request, reply })
      .await?
  }

  pub async fn push(&self, payload: Vec<u8>) -> Result<PushReport> {
    self.call(|reply| AgentEvent::Push { payload, reply }).await
  }

  pub async fn click(&self, click: NotificationClick) -> Result<ClickOutcome> {
    self
      .call(|reply| AgentEvent::NotificationClick { click, reply })
      .await?
  }

  pub async fn close(&self, tag: String) -> Result<()> {
    self
      .call(|reply| AgentEvent::NotificationClose { tag, reply })
      .await
  }

  pub async fn enqueue(&self, tag: String) -> Result<bool> {
    self.call(|reply| AgentEvent::Enqueue { tag, reply }).await?
  }

  pub async fn connectivity_restored(&self) -> Result<SyncReport> {
    self
      .call(|reply| AgentEvent::ConnectivityRestored { reply })
      .await?
  }
}
