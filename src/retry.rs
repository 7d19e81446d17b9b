//! Offline mutations waiting for connectivity.
//!
//! The application records a tag when a mutation cannot reach the backend.
//! When connectivity returns, every pending tag is handed to a [`Replayer`]
//! once; only a successful replay clears it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::cache::{parse_datetime, SqliteStorage};
use crate::clients::{broadcast, ClientSignal, Clients};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTask {
  pub tag: String,
  pub enqueued_at: DateTime<Utc>,
}

/// Durable storage of pending tasks.
pub trait RetryStore: Send + Sync {
  /// Insert `tag` unless already pending. Returns true if it was added.
  fn insert_task(&self, tag: &str) -> Result<bool>;

  /// Pending tasks, oldest first.
  fn pending_tasks(&self) -> Result<Vec<RetryTask>>;

  fn remove_task(&self, tag: &str) -> Result<()>;

  fn is_pending(&self, tag: &str) -> Result<bool>;
}

impl RetryStore for SqliteStorage {
  fn insert_task(&self, tag: &str) -> Result<bool> {
    let conn = self.lock()?;
    let inserted = conn
      .execute(
        "INSERT OR IGNORE INTO retry_tasks (tag, enqueued_at) VALUES (?, ?)",
        params![tag, Utc::now().to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to enqueue retry task {}: {}", tag, e))?;
    Ok(inserted > 0)
  }

  fn pending_tasks(&self) -> Result<Vec<RetryTask>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT tag, enqueued_at FROM retry_tasks ORDER BY enqueued_at, tag")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows = stmt
      .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
      .map_err(|e| eyre!("Failed to query retry tasks: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read retry task row: {}", e))?;

    rows
      .into_iter()
      .map(|(tag, enqueued_at)| {
        Ok(RetryTask {
          tag,
          enqueued_at: parse_datetime(&enqueued_at)?,
        })
      })
      .collect()
  }

  fn remove_task(&self, tag: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM retry_tasks WHERE tag = ?", params![tag])
      .map_err(|e| eyre!("Failed to remove retry task {}: {}", tag, e))?;
    Ok(())
  }

  fn is_pending(&self, tag: &str) -> Result<bool> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT EXISTS(SELECT 1 FROM retry_tasks WHERE tag = ?)",
        params![tag],
        |row| row.get::<_, bool>(0),
      )
      .map_err(|e| eyre!("Failed to look up retry task {}: {}", tag, e))
  }
}

/// Performs the replay of one tagged mutation. Lives in the application.
#[async_trait]
pub trait Replayer: Send + Sync {
  async fn replay(&self, tag: &str) -> Result<()>;
}

/// Asks open instances to replay; fails when no instance received the request.
pub struct ClientReplayer {
  clients: Arc<dyn Clients>,
}

impl ClientReplayer {
  pub fn new(clients: Arc<dyn Clients>) -> Self {
    Self { clients }
  }
}

#[async_trait]
impl Replayer for ClientReplayer {
  async fn replay(&self, tag: &str) -> Result<()> {
    let signal = ClientSignal::ReplayRequested {
      tag: tag.to_string(),
    };
    match broadcast(self.clients.as_ref(), &signal).await {
      0 => Err(eyre!("No open instance to replay {}", tag)),
      _ => Ok(()),
    }
  }
}

/// Outcome of one reconnection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Tags replayed and cleared
  pub replayed: Vec<String>,
  /// Tags whose replay failed; still pending
  pub failed: Vec<String>,
  /// Tags in flight or already cleared by another pass
  pub skipped: Vec<String>,
}

pub struct RetryQueue<S: RetryStore> {
  store: Arc<S>,
  replayer: Arc<dyn Replayer>,
  in_flight: Mutex<HashSet<String>>,
}

impl<S: RetryStore> RetryQueue<S> {
  pub fn new(store: Arc<S>, replayer: Arc<dyn Replayer>) -> Self {
    Self {
      store,
      replayer,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Record that `tag` needs replay. Idempotent per tag.
  pub fn enqueue(&self, tag: &str) -> Result<bool> {
    let added = self.store.insert_task(tag)?;
    if added {
      info!(tag, "queued offline mutation for replay");
    } else {
      debug!(tag, "retry task already pending");
    }
    Ok(added)
  }

  pub fn pending(&self) -> Result<Vec<RetryTask>> {
    self.store.pending_tasks()
  }

  /// Replay every pending tag once. Failed tags stay queued.
  pub async fn on_reconnect(&self) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for task in self.store.pending_tasks()? {
      if !self.claim(&task.tag)? {
        report.skipped.push(task.tag);
        continue;
      }
      // The snapshot may be stale; another pass can have cleared the tag since
      match self.store.is_pending(&task.tag) {
        Ok(true) => {}
        Ok(false) => {
          debug!(tag = %task.tag, "retry task already replayed");
          self.release(&task.tag);
          report.skipped.push(task.tag);
          continue;
        }
        Err(e) => {
          self.release(&task.tag);
          return Err(e);
        }
      }

      let result = self.replayer.replay(&task.tag).await;
      let outcome = match result {
        Ok(()) => self.store.remove_task(&task.tag),
        Err(e) => Err(e),
      };
      self.release(&task.tag);

      match outcome {
        Ok(()) => {
          info!(tag = %task.tag, "replayed offline mutation");
          report.replayed.push(task.tag);
        }
        Err(e) => {
          warn!(tag = %task.tag, error = %e, "replay failed, keeping task");
          report.failed.push(task.tag);
        }
      }
    }

    Ok(report)
  }

  fn claim(&self, tag: &str) -> Result<bool> {
    let mut in_flight = self
      .in_flight
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(in_flight.insert(tag.to_string()))
  }

  fn release(&self, tag: &str) {
    if let Ok(mut in_flight) = self.in_flight.lock() {
      in_flight.remove(tag);
    }
  }
}
