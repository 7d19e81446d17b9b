//! Defensive parsing of push payloads into notification descriptors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::NotificationConfig;

/// Action id that closes a notification without opening anything.
pub const DISMISS_ACTION: &str = "dismiss";

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub id: String,
  pub label: String,
  /// Target override used when this action is clicked
  pub url: Option<String>,
}

impl NotificationAction {
  fn new(id: &str, label: &str) -> Self {
    Self {
      id: id.to_string(),
      label: label.to_string(),
      url: None,
    }
  }
}

/// A push message normalized for display. Every field has a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationDescriptor {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<NotificationAction>,
  pub target_url: String,
  pub arrived_at: DateTime<Utc>,
}

impl NotificationDescriptor {
  /// Descriptor with every field defaulted and the given body.
  pub fn with_body(body: &str, defaults: &NotificationConfig) -> Self {
    let body = if body.trim().is_empty() {
      defaults.default_body.clone()
    } else {
      body.to_string()
    };

    Self {
      title: defaults.default_title.clone(),
      body,
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      tag: defaults.default_tag.clone(),
      require_interaction: false,
      actions: default_actions(),
      target_url: "/".to_string(),
      arrived_at: Utc::now(),
    }
  }

  pub fn action(&self, id: &str) -> Option<&NotificationAction> {
    self.actions.iter().find(|action| action.id == id)
  }
}

fn default_actions() -> Vec<NotificationAction> {
  vec![
    NotificationAction::new("open", "Open"),
    NotificationAction::new(DISMISS_ACTION, "Dismiss"),
  ]
}

#[derive(Debug, Deserialize)]
struct RawAction {
  #[serde(alias = "id")]
  action: String,
  #[serde(alias = "label")]
  title: Option<String>,
  url: Option<String>,
}

/// Parse a delivered payload. Never fails.
///
/// A JSON object is read field by field; a field with the wrong type keeps
/// its default. Anything else (malformed JSON, a bare JSON value, binary
/// junk) becomes the body text.
pub fn parse_payload(payload: &[u8], defaults: &NotificationConfig) -> NotificationDescriptor {
  let object = match serde_json::from_slice::<Value>(payload) {
    Ok(Value::Object(object)) => object,
    Ok(Value::String(text)) => return NotificationDescriptor::with_body(&text, defaults),
    Ok(_) | Err(_) => {
      debug!("push payload is not a JSON object, using it as text");
      let text = String::from_utf8_lossy(payload);
      return NotificationDescriptor::with_body(&text, defaults);
    }
  };

  let mut descriptor = NotificationDescriptor::with_body(text_field(&object, "body").unwrap_or(""), defaults);

  if let Some(title) = non_empty(text_field(&object, "title")) {
    descriptor.title = title;
  }
  if let Some(icon) = non_empty(text_field(&object, "icon")) {
    descriptor.icon = icon;
  }
  if let Some(badge) = non_empty(text_field(&object, "badge")) {
    descriptor.badge = badge;
  }
  if let Some(tag) = non_empty(text_field(&object, "tag")) {
    descriptor.tag = tag;
  }
  match object.get("requireInteraction") {
    Some(Value::Bool(require_interaction)) => descriptor.require_interaction = *require_interaction,
    Some(other) => debug!(value = %other, "ignoring non-boolean requireInteraction"),
    None => {}
  }

  let data_url = object
    .get("data")
    .and_then(|data| data.get("url"))
    .and_then(Value::as_str);
  if let Some(url) = non_empty(text_field(&object, "url")).or_else(|| non_empty(data_url)) {
    descriptor.target_url = url;
  }

  let actions: Vec<NotificationAction> = object
    .get("actions")
    .and_then(Value::as_array)
    .map(|actions| actions.iter().filter_map(parse_action).collect())
    .unwrap_or_default();
  if !actions.is_empty() {
    descriptor.actions = actions;
  }

  descriptor
}

fn text_field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
  match object.get(name) {
    Some(Value::String(text)) => Some(text.as_str()),
    Some(other) => {
      debug!(field = name, value = %other, "ignoring non-string push field");
      None
    }
    None => None,
  }
}

fn parse_action(value: &Value) -> Option<NotificationAction> {
  match serde_json::from_value::<RawAction>(value.clone()) {
    Ok(raw) => Some(NotificationAction {
      label: raw.title.unwrap_or_else(|| raw.action.clone()),
      id: raw.action,
      url: raw.url,
    }),
    Err(e) => {
      debug!(error = %e, "skipping malformed notification action");
      None
    }
  }
}

fn non_empty(value: Option<&str>) -> Option<String> {
  value.filter(|v| !v.trim().is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn defaults() -> NotificationConfig {
    NotificationConfig::default()
  }

  #[test]
  fn test_full_payload() {
    let payload = br#"{
      "title": "Study time",
      "body": "5 cards due",
      "tag": "due-cards",
      "requireInteraction": true,
      "actions": [{"action": "review", "title": "Review", "url": "/review"}],
      "data": {"url": "/calendar"}
    }"#;

    let descriptor = parse_payload(payload, &defaults());

    assert_eq!(descriptor.title, "Study time");
    assert_eq!(descriptor.body, "5 cards due");
    assert_eq!(descriptor.tag, "due-cards");
    assert!(descriptor.require_interaction);
    assert_eq!(descriptor.target_url, "/calendar");
    assert_eq!(descriptor.actions.len(), 1);
    assert_eq!(descriptor.action("review").unwrap().url.as_deref(), Some("/review"));
    assert_eq!(descriptor.icon, defaults().icon);
  }

  #[test]
  fn test_body_only_payload_is_fully_formed() {
    let descriptor = parse_payload(br#"{"body": "hello"}"#, &defaults());

    assert_eq!(descriptor.body, "hello");
    assert_eq!(descriptor.title, defaults().default_title);
    assert_eq!(descriptor.tag, defaults().default_tag);
    assert_eq!(descriptor.target_url, "/");
    assert!(descriptor.action(DISMISS_ACTION).is_some());
    assert!(!descriptor.require_interaction);
  }

  #[test]
  fn test_malformed_json_becomes_body() {
    let descriptor = parse_payload(b"{not json", &defaults());
    assert_eq!(descriptor.body, "{not json");
    assert_eq!(descriptor.title, defaults().default_title);
  }

  #[test]
  fn test_plain_text_payload() {
    let descriptor = parse_payload(b"Time to review your deck", &defaults());
    assert_eq!(descriptor.body, "Time to review your deck");
  }

  #[test]
  fn test_json_string_and_number_payloads() {
    assert_eq!(parse_payload(br#""quoted""#, &defaults()).body, "quoted");
    assert_eq!(parse_payload(b"42", &defaults()).body, "42");
  }

  #[test]
  fn test_wrong_field_type_keeps_other_fields() {
    let payload = br#"{"title": "Study time", "body": "5 cards due", "requireInteraction": "true"}"#;

    let descriptor = parse_payload(payload, &defaults());

    assert_eq!(descriptor.title, "Study time");
    assert_eq!(descriptor.body, "5 cards due");
    assert!(!descriptor.require_interaction);
  }

  #[test]
  fn test_non_string_fields_use_defaults() {
    let descriptor = parse_payload(br#"{"title": 7, "tag": ["x"], "body": "due"}"#, &defaults());

    assert_eq!(descriptor.title, defaults().default_title);
    assert_eq!(descriptor.tag, defaults().default_tag);
    assert_eq!(descriptor.body, "due");
  }

  #[test]
  fn test_malformed_action_is_skipped() {
    let payload = br#"{"actions": [{"label": "no id"}, {"action": "review"}]}"#;
    let descriptor = parse_payload(payload, &defaults());

    assert_eq!(descriptor.actions.len(), 1);
    assert_eq!(descriptor.actions[0].id, "review");
  }

  #[test]
  fn test_empty_payload_uses_default_body() {
    let descriptor = parse_payload(b"", &defaults());
    assert_eq!(descriptor.body, defaults().default_body);
  }

  #[test]
  fn test_top_level_url_wins_over_data_url() {
    let descriptor = parse_payload(br#"{"url": "/tasks", "data": {"url": "/calendar"}}"#, &defaults());
    assert_eq!(descriptor.target_url, "/tasks");
  }

  #[test]
  fn test_action_without_title_uses_id_as_label() {
    let descriptor = parse_payload(br#"{"actions": [{"id": "snooze"}]}"#, &defaults());
    assert_eq!(descriptor.actions[0].label, "snooze");
  }
}
