mod agent;
mod cache;
mod clients;
mod config;
mod event;
mod host;
mod http;
mod interaction;
mod logging;
mod network;
mod push;
mod retry;
mod routing;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::agent::{Agent, Host};
use crate::cache::SqliteStorage;
use crate::event::AgentHandle;
use crate::host::ConsoleHost;
use crate::http::{Destination, Request, RequestMode};
use crate::interaction::{ClickOutcome, NotificationClick};
use crate::network::HttpNetwork;
use crate::push::NotificationDescriptor;
use crate::retry::ClientReplayer;

#[derive(Parser, Debug)]
#[command(name = "tidewater")]
#[command(about = "Offline interception agent: cache routing, push notifications and retry sync")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tidewater/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Override the cache generation tag
  #[arg(short, long, global = true)]
  generation: Option<String>,

  /// Keep the cache in memory instead of on disk
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Log at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the app shell and remove stale cache generations
  Activate,
  /// Route one request through the agent and print the response
  Fetch {
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request destination (document, script, image, audio, ...)
    #[arg(short, long, default_value = "empty")]
    destination: Destination,
    /// Accept header value
    #[arg(long)]
    accept: Option<String>,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Deliver a push payload (text or JSON)
  Push {
    payload: Option<String>,
    /// Read the payload from a file
    #[arg(short, long, conflicts_with = "payload")]
    file: Option<PathBuf>,
  },
  /// Click a notification or one of its actions
  Click {
    #[arg(long)]
    tag: String,
    #[arg(long)]
    action: Option<String>,
    /// Notification target URL
    #[arg(long, default_value = "/")]
    url: String,
  },
  /// Close a notification without activating it
  Close {
    #[arg(long)]
    tag: String,
  },
  /// Record an offline mutation for replay
  Enqueue { tag: String },
  /// Signal that connectivity is back and replay pending mutations
  Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override generation if specified on command line
  let config = if let Some(generation) = args.generation {
    config::Config {
      generation,
      ..config
    }
  } else {
    config
  };

  let _log_guard = logging::init(&config.log, args.verbose)?;

  let storage = if args.ephemeral {
    SqliteStorage::in_memory()?
  } else {
    match &config.cache.path {
      Some(path) => SqliteStorage::open_at(path)?,
      None => SqliteStorage::open()?,
    }
  };

  let console = Arc::new(ConsoleHost::new(config.origin.clone()));
  let host = Host {
    network: Arc::new(HttpNetwork::new(&config.network, config.origin.clone())?),
    notifier: console.clone(),
    clients: console.clone(),
    replayer: Arc::new(ClientReplayer::new(console)),
  };

  let notification_defaults = config.notifications.clone();
  let agent = Agent::new(config, Arc::new(storage), host);
  let (handle, events) = event::channel();
  let runner = tokio::spawn(agent.run(events));

  let result = execute(args.command, &handle, &notification_defaults).await;

  drop(handle);
  runner
    .await
    .map_err(|e| eyre!("Agent event loop failed: {}", e))?;

  result
}

async fn execute(
  command: Command,
  handle: &AgentHandle,
  notification_defaults: &config::NotificationConfig,
) -> Result<()> {
  match command {
    Command::Activate => {
      let report = handle.activate().await?;
      for path in &report.precached {
        println!("precached {}", path);
      }
      for path in &report.precache_failed {
        println!("precache failed {}", path);
      }
      for name in &report.cleanup.removed {
        println!("removed {}", name);
      }
      for (name, error) in &report.cleanup.failed {
        println!("could not remove {}: {}", name, error);
      }
    }
    Command::Fetch {
      url,
      method,
      destination,
      accept,
      navigate,
    } => {
      let mut request = Request::parse_get(&url)?
        .with_method(&method)
        .with_destination(destination);
      if let Some(accept) = accept {
        request = request.with_header("accept", &accept);
      }
      if navigate {
        request = request.with_mode(RequestMode::Navigate);
      }

      let served = handle
        .fetch(request)
        .await?
        .ok_or_else(|| eyre!("No response available for {} (offline and not cached)", url))?;

      println!("{} ({:?})", served.response.status, served.source);
      if let Some(stored_at) = served.stored_at {
        println!("cached at {}", stored_at.to_rfc3339());
      }
      for (name, value) in &served.response.headers {
        println!("{}: {}", name, value);
      }
      println!();
      println!("{}", String::from_utf8_lossy(&served.response.body));
    }
    Command::Push { payload, file } => {
      let payload = match (payload, file) {
        (_, Some(path)) => std::fs::read(&path)
          .map_err(|e| eyre!("Failed to read payload file {}: {}", path.display(), e))?,
        (Some(text), None) => text.into_bytes(),
        (None, None) => Vec::new(),
      };

      let report = handle.push(payload).await?;
      println!(
        "displayed: {}, signalled instances: {}",
        report.displayed, report.signalled
      );
    }
    Command::Click { tag, action, url } => {
      let mut notification = NotificationDescriptor::with_body("", notification_defaults);
      notification.tag = tag;
      notification.target_url = url;

      match handle.click(NotificationClick { notification, action }).await? {
        ClickOutcome::Dismissed => println!("dismissed"),
        ClickOutcome::Focused { client_id, url } => println!("focused {} at {}", client_id, url),
        ClickOutcome::Opened { url } => println!("opened {}", url),
      }
    }
    Command::Close { tag } => {
      handle.close(tag).await?;
    }
    Command::Enqueue { tag } => {
      if handle.enqueue(tag.clone()).await? {
        println!("queued {}", tag);
      } else {
        println!("{} already pending", tag);
      }
    }
    Command::Sync => {
      let report = handle.connectivity_restored().await?;
      for tag in &report.replayed {
        println!("replayed {}", tag);
      }
      for tag in &report.failed {
        println!("still pending {}", tag);
      }
    }
  }

  Ok(())
}
