//! Network transport used by the routing engine.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::NetworkConfig;
use crate::http::{Headers, Request, Response, ResponseKind};

/// Something that can perform a request on the real network.
///
/// An `Err` means the network could not produce a response at all
/// (offline, DNS, reset, timeout). HTTP error statuses are responses.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(config: &NetworkConfig, origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .user_agent(config.user_agent.clone())
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let headers: Headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    let kind = if request.is_same_origin(&self.origin) {
      ResponseKind::Basic
    } else {
      ResponseKind::Cors
    };

    debug!(url = %request.url, status, bytes = body.len(), "network response");

    Ok(Response {
      status,
      headers,
      body,
      kind,
    })
  }
}
