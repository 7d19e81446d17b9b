use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the agent serves; same-origin instances are focused on click
  pub origin: Url,
  /// Generation tag embedded in cache namespace names. Bump to invalidate.
  pub generation: String,
  /// App-shell paths stored in the static namespace during activation
  pub precache: Vec<String>,
  pub routing: RoutingConfig,
  pub notifications: NotificationConfig,
  pub cache: CacheConfig,
  pub network: NetworkConfig,
  pub log: LogConfig,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: Url::parse("http://localhost:5173").expect("static origin is valid"),
      generation: "v1".to_string(),
      precache: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
      ],
      routing: RoutingConfig::default(),
      notifications: NotificationConfig::default(),
      cache: CacheConfig::default(),
      network: NetworkConfig::default(),
      log: LogConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
  /// Hostnames that are never cached; offline calls get a JSON error (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub live_api_hosts: BTreeSet<String>,
  /// File extensions treated as audio, without the dot (case-insensitive)
  #[serde(deserialize_with = "deserialize_lowercase_set")]
  pub audio_extensions: BTreeSet<String>,
  /// URL prefixes of remote ambience sounds
  pub ambience_allowlist: Vec<String>,
  /// URL prefixes of external resources cached even when opaque
  pub external_allowlist: Vec<String>,
  /// Path segment marking build assets served network-first
  pub asset_segment: String,
}

impl Default for RoutingConfig {
  fn default() -> Self {
    Self {
      live_api_hosts: [
        "firestore.googleapis.com",
        "identitytoolkit.googleapis.com",
        "securetoken.googleapis.com",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      audio_extensions: ["mp3", "wav", "ogg", "m4a", "aac", "flac", "opus"]
        .into_iter()
        .map(String::from)
        .collect(),
      ambience_allowlist: vec!["https://assets.mixkit.co/".to_string()],
      external_allowlist: vec![
        "https://fonts.googleapis.com/".to_string(),
        "https://fonts.gstatic.com/".to_string(),
      ],
      asset_segment: "assets".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub default_title: String,
  pub default_body: String,
  pub icon: String,
  pub badge: String,
  /// Tag used when a payload carries none
  pub default_tag: String,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      default_title: "Reminder".to_string(),
      default_body: "You have a new notification".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/badge-72x72.png".to_string(),
      default_tag: "general".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Database path (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      user_agent: concat!("tidewater/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Directory for rolling log files (defaults to the user data directory)
  pub directory: Option<PathBuf>,
  /// `EnvFilter` directive used when RUST_LOG is unset
  pub filter: Option<String>,
}

impl LogConfig {
  pub fn directory(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.directory {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("tidewater").join("logs"))
  }
}

fn deserialize_lowercase_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Vec<String> = Vec::deserialize(deserializer)?;
  Ok(v.into_iter().map(|s| s.to_lowercase()).collect())
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./tidewater.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/tidewater/config.yaml
  ///
  /// Falls back to built-in defaults when no file exists.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("tidewater.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("tidewater").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.generation.trim().is_empty() {
      return Err(eyre!("generation must not be empty"));
    }

    Ok(config)
  }
}
