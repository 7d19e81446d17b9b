//! Ordered request classification rules.

use std::collections::BTreeSet;

use crate::config::RoutingConfig;
use crate::http::{Destination, Request, RequestMode};

/// How a classified request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network only, no cache access. Network errors reach the caller.
  Passthrough,
  /// Network only; offline yields a JSON error response.
  LiveApi,
  /// Network, falling back to cache (and to the root document if `root_fallback`).
  NetworkFirst { root_fallback: bool },
  /// Cache, then network; offline and uncached yields 404.
  CacheFirstAudio,
  /// Cache, then network; offline images get a placeholder.
  CacheFirst,
}

/// Request predicate of a rule.
#[derive(Debug, Clone)]
pub enum Matcher {
  /// Hostname is in the set.
  Host(BTreeSet<String>),
  /// Page navigation or HTML document.
  Navigation,
  /// Script or worker, or a path containing `segment`.
  ScriptAsset { segment: String },
  /// Audio destination, audio file extension, or an allowlisted URL prefix.
  Audio {
    extensions: BTreeSet<String>,
    allowlist: Vec<String>,
  },
  Any,
}

impl Matcher {
  pub fn matches(&self, request: &Request) -> bool {
    match self {
      Self::Host(hosts) => request
        .url
        .host_str()
        .is_some_and(|host| hosts.contains(&host.to_ascii_lowercase())),
      Self::Navigation => {
        request.mode == RequestMode::Navigate
          || request.destination == Destination::Document
          || request
            .header("accept")
            .is_some_and(|accept| accept.contains("text/html"))
      }
      Self::ScriptAsset { segment } => {
        matches!(request.destination, Destination::Script | Destination::Worker)
          || request
            .url
            .path_segments()
            .is_some_and(|mut segments| segments.any(|s| s == segment))
      }
      Self::Audio {
        extensions,
        allowlist,
      } => {
        request.destination == Destination::Audio
          || extension(request).is_some_and(|ext| extensions.contains(&ext))
          || matches_prefix(allowlist, request.url.as_str())
      }
      Self::Any => true,
    }
  }
}

/// One `(matcher, strategy)` pair.
#[derive(Debug, Clone)]
pub struct RoutingRule {
  pub name: &'static str,
  pub matcher: Matcher,
  pub strategy: Strategy,
}

/// Rules evaluated in order; first match wins.
#[derive(Debug, Clone)]
pub struct RuleSet {
  rules: Vec<RoutingRule>,
}

/// Outcome of classifying a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
  pub rule: &'static str,
  pub strategy: Strategy,
}

impl RuleSet {
  pub fn from_config(config: &RoutingConfig) -> Self {
    let rules = vec![
      RoutingRule {
        name: "live-api",
        matcher: Matcher::Host(config.live_api_hosts.clone()),
        strategy: Strategy::LiveApi,
      },
      RoutingRule {
        name: "navigation",
        matcher: Matcher::Navigation,
        strategy: Strategy::NetworkFirst {
          root_fallback: true,
        },
      },
      RoutingRule {
        name: "script-asset",
        matcher: Matcher::ScriptAsset {
          segment: config.asset_segment.clone(),
        },
        strategy: Strategy::NetworkFirst {
          root_fallback: false,
        },
      },
      RoutingRule {
        name: "audio",
        matcher: Matcher::Audio {
          extensions: config.audio_extensions.clone(),
          allowlist: config.ambience_allowlist.clone(),
        },
        strategy: Strategy::CacheFirstAudio,
      },
      RoutingRule {
        name: "default",
        matcher: Matcher::Any,
        strategy: Strategy::CacheFirst,
      },
    ];

    Self { rules }
  }

  #[cfg(test)]
  pub fn rules(&self) -> &[RoutingRule] {
    &self.rules
  }

  /// Pick the strategy for `request`.
  ///
  /// Non-GET requests and non-HTTP(S) schemes never reach the rules.
  pub fn classify(&self, request: &Request) -> Classification {
    if !request.is_get() || !request.is_http() {
      return Classification {
        rule: "bypass",
        strategy: Strategy::Passthrough,
      };
    }

    self
      .rules
      .iter()
      .find(|rule| rule.matcher.matches(request))
      .map(|rule| Classification {
        rule: rule.name,
        strategy: rule.strategy,
      })
      .unwrap_or(Classification {
        rule: "default",
        strategy: Strategy::CacheFirst,
      })
  }
}

/// True if `url` starts with any of `prefixes`.
pub fn matches_prefix(prefixes: &[String], url: &str) -> bool {
  prefixes.iter().any(|prefix| url.starts_with(prefix.as_str()))
}

/// Lowercased extension of the last path segment.
fn extension(request: &Request) -> Option<String> {
  let last = request.url.path_segments()?.next_back()?;
  let (_, ext) = last.rsplit_once('.')?;
  Some(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rules() -> RuleSet {
    let mut config = RoutingConfig::default();
    config.live_api_hosts = ["api.study.test".to_string()].into_iter().collect();
    config.ambience_allowlist = vec!["https://sounds.test/ambience/".to_string()];
    RuleSet::from_config(&config)
  }

  fn get(url: &str) -> Request {
    Request::parse_get(url).unwrap()
  }

  #[test]
  fn test_non_get_bypasses_rules() {
    let request = get("https://app.test/index.html").with_method("post");
    assert_eq!(rules().classify(&request).strategy, Strategy::Passthrough);
  }

  #[test]
  fn test_non_http_scheme_bypasses_rules() {
    let request = get("chrome-extension://abc/script.js");
    assert_eq!(rules().classify(&request).rule, "bypass");
  }

  #[test]
  fn test_live_api_wins_over_navigation() {
    let request = get("https://API.study.test/v1/tasks").with_mode(RequestMode::Navigate);
    assert_eq!(rules().classify(&request).strategy, Strategy::LiveApi);
  }

  #[test]
  fn test_navigation_by_mode_destination_or_accept() {
    let rules = rules();
    let by_mode = get("https://app.test/calendar").with_mode(RequestMode::Navigate);
    let by_dest = get("https://app.test/calendar").with_destination(Destination::Document);
    let by_accept = get("https://app.test/calendar").with_header("Accept", "text/html,*/*");

    for request in [by_mode, by_dest, by_accept] {
      assert_eq!(
        rules.classify(&request).strategy,
        Strategy::NetworkFirst {
          root_fallback: true
        }
      );
    }
  }

  #[test]
  fn test_scripts_and_asset_paths_are_network_first_without_root_fallback() {
    let rules = rules();
    let script = get("https://app.test/main.js").with_destination(Destination::Script);
    let asset = get("https://app.test/assets/logo.svg").with_destination(Destination::Image);

    for request in [script, asset] {
      assert_eq!(rules.classify(&request).rule, "script-asset");
    }
  }

  #[test]
  fn test_audio_by_destination_extension_or_allowlist() {
    let rules = rules();
    let by_dest = get("https://cdn.test/stream").with_destination(Destination::Audio);
    let by_ext = get("https://app.test/sounds/chime.MP3");
    let by_allowlist = get("https://sounds.test/ambience/rain");

    for request in [by_dest, by_ext, by_allowlist] {
      assert_eq!(rules.classify(&request).strategy, Strategy::CacheFirstAudio);
    }
  }

  #[test]
  fn test_everything_else_is_cache_first() {
    let request = get("https://app.test/icons/icon.png").with_destination(Destination::Image);
    assert_eq!(rules().classify(&request).strategy, Strategy::CacheFirst);
  }

  #[test]
  fn test_rules_are_in_priority_order() {
    let names: Vec<_> = rules().rules().iter().map(|r| r.name).collect();
    assert_eq!(
      names,
      vec!["live-api", "navigation", "script-asset", "audio", "default"]
    );
  }
}
