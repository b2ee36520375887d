//! Reminder notifications built from push payloads, and routing of their clicks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::form_urlencoded;

const DEFAULT_TITLE: &str = "MedAid";
const ICON: &str = "/icons/icon-192x192.png";
const BADGE: &str = "/icons/badge-72x72.png";
const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];

/// Data attached to a notification and echoed back on click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationData {
  /// Reminder identifier
  #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient_id")]
  pub id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Accept ids sent as numbers as well as strings.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Ok(match Value::deserialize(deserializer)? {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
  /// Mark the reminder as taken
  Taken,
  /// Snooze the reminder for 15 minutes
  Snooze,
}

impl NotificationAction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Taken => "taken",
      Self::Snooze => "snooze",
    }
  }

  pub fn parse(action: &str) -> Option<Self> {
    match action {
      "taken" => Some(Self::Taken),
      "snooze" => Some(Self::Snooze),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationActionButton {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub data: NotificationData,
  pub actions: Vec<NotificationActionButton>,
}

impl Notification {
  /// Build a reminder notification from a raw `{title?, body?, data?}` payload.
  ///
  /// Each field is read on its own; a missing or malformed one falls back to
  /// its default without discarding the others.
  pub fn from_push(payload: &[u8]) -> Self {
    let payload: Value = serde_json::from_slice(payload).unwrap_or(Value::Null);

    let title = payload
      .get("title")
      .and_then(Value::as_str)
      .unwrap_or(DEFAULT_TITLE);
    let body = payload.get("body").and_then(Value::as_str).unwrap_or_default();
    let data = payload
      .get("data")
      .and_then(|data| NotificationData::deserialize(data).ok())
      .unwrap_or_default();

    Self::reminder(title, body, data)
  }

  /// Reminder notification with the taken/snooze actions.
  pub fn reminder(title: &str, body: &str, data: NotificationData) -> Self {
    Self {
      title: title.to_string(),
      body: body.to_string(),
      icon: ICON.to_string(),
      badge: BADGE.to_string(),
      vibrate: VIBRATE_PATTERN.to_vec(),
      data,
      actions: vec![
        NotificationActionButton {
          action: NotificationAction::Taken.as_str().to_string(),
          title: "Taken".to_string(),
          icon: "/icons/check.png".to_string(),
        },
        NotificationActionButton {
          action: NotificationAction::Snooze.as_str().to_string(),
          title: "Snooze 15min".to_string(),
          icon: "/icons/snooze.png".to_string(),
        },
      ],
    }
  }
}

/// A click on a shown notification. `action` is `None` for a plain tap.
#[derive(Debug, Clone)]
pub struct NotificationClick {
  pub notification: Notification,
  pub action: Option<String>,
}

impl NotificationClick {
  /// App URL to open for this click.
  pub fn target_url(&self) -> String {
    match self.action.as_deref().and_then(NotificationAction::parse) {
      Some(action) => {
        let query = form_urlencoded::Serializer::new(String::new())
          .append_pair("action", action.as_str())
          .append_pair("id", self.notification.data.id.as_deref().unwrap_or_default())
          .finish();
        format!("/reminders?{}", query)
      }
      None => "/".to_string(),
    }
  }
}
