//! Terminal host: notifications and client calls are printed to stdout.

use async_trait::async_trait;
use color_eyre::Result;
use url::Url;

use crate::clients::{ClientInfo, ClientSignal, Clients};
use crate::push::{NotificationCenter, NotificationRequest, Notifier};

const CONSOLE_CLIENT_ID: &str = "console";

/// Host backed by the terminal, presenting itself as one open instance.
pub struct ConsoleHost {
  origin: Url,
  center: NotificationCenter,
}

impl ConsoleHost {
  pub fn new(origin: Url) -> Self {
    Self {
      origin,
      center: NotificationCenter::new(),
    }
  }
}

#[async_trait]
impl Notifier for ConsoleHost {
  async fn show(&self, request: &NotificationRequest) -> Result<()> {
    let d = &request.descriptor;
    println!("[notification:{}] {}", d.tag, d.title);
    println!("  {}", d.body);
    if !d.actions.is_empty() {
      let labels: Vec<_> = d
        .actions
        .iter()
        .map(|a| format!("{} ({})", a.label, a.id))
        .collect();
      println!("  actions: {}", labels.join(", "));
    }
    println!("  opens: {}", d.target_url);
    self.center.show(request).await
  }

  async fn close(&self, tag: &str) -> Result<()> {
    println!("[notification:{}] closed", tag);
    self.center.close(tag).await
  }
}

#[async_trait]
impl Clients for ConsoleHost {
  async fn match_all(&self, _include_uncontrolled: bool) -> Result<Vec<ClientInfo>> {
    Ok(vec![ClientInfo {
      id: CONSOLE_CLIENT_ID.to_string(),
      url: self.origin.clone(),
      controlled: true,
    }])
  }

  async fn post_message(&self, client_id: &str, signal: &ClientSignal) -> Result<()> {
    println!("[client:{}] signal {}", client_id, serde_json::to_string(signal)?);
    Ok(())
  }

  async fn navigate(&self, client_id: &str, url: &Url) -> Result<()> {
    println!("[client:{}] navigate {}", client_id, url);
    Ok(())
  }

  async fn focus(&self, client_id: &str) -> Result<()> {
    println!("[client:{}] focus", client_id);
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("[client:new] open {}", url);
    Ok(())
  }
}
