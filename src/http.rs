//! Request and response descriptors seen by the interception hook.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Header map with lowercased names.
pub type Headers = BTreeMap<String, String>;

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  #[default]
  Empty,
  Document,
  Script,
  Worker,
  Style,
  Image,
  Audio,
  Font,
}

impl std::str::FromStr for Destination {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_lowercase().as_str() {
      "" | "empty" => Ok(Self::Empty),
      "document" => Ok(Self::Document),
      "script" => Ok(Self::Script),
      "worker" => Ok(Self::Worker),
      "style" => Ok(Self::Style),
      "image" => Ok(Self::Image),
      "audio" => Ok(Self::Audio),
      "font" => Ok(Self::Font),
      other => Err(eyre!("Unknown request destination: {}", other)),
    }
  }
}

/// Request mode as reported by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
  Navigate,
  SameOrigin,
  #[default]
  Cors,
  NoCors,
}

/// An intercepted outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub headers: Headers,
  pub destination: Destination,
  pub mode: RequestMode,
}

impl Request {
  /// A plain GET with no headers and an empty destination.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      headers: Headers::new(),
      destination: Destination::Empty,
      mode: RequestMode::Cors,
    }
  }

  /// Parse `url` and build a GET request for it.
  pub fn parse_get(url: &str) -> Result<Self> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid request URL {}: {}", url, e))?;
    Ok(Self::get(url))
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_mode(mut self, mode: RequestMode) -> Self {
    self.mode = mode;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.insert(name.to_ascii_lowercase(), value.to_string());
    self
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(&name.to_ascii_lowercase())
      .map(String::as_str)
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }

  /// True when the request shares the scheme, host and port of `origin`.
  pub fn is_same_origin(&self, origin: &Url) -> bool {
    self.url.origin() == origin.origin()
  }
}

/// How much of the response the requesting context may observe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
  /// Same-origin response.
  #[default]
  Basic,
  /// Cross-origin response readable under CORS.
  Cors,
  /// Cross-origin response with hidden status and body.
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Self {
    match s {
      "cors" => Self::Cors,
      "opaque" => Self::Opaque,
      _ => Self::Basic,
    }
  }
}

/// A response snapshot. Cached entries hold exactly this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Headers,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
    let mut headers = Headers::new();
    headers.insert("content-type".to_string(), content_type.to_string());
    Self {
      status,
      headers,
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  pub fn with_kind(mut self, kind: ResponseKind) -> Self {
    self.kind = kind;
    self
  }

  /// Status in the 2xx range.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self.headers.get("content-type").map(String::as_str)
  }
}
