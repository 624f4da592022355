// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event types delivered to the collection endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::breadcrumb::Breadcrumb;
use crate::error::CoreError;

/// Platform identifier stamped on every event unless overridden.
pub const DEFAULT_PLATFORM: &str = "rust";

/// Unique identifier for a captured event.
///
/// Rendered as 32 lowercase hex characters (a v4 UUID without hyphens).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for EventId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for EventId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0.simple())
	}
}

impl FromStr for EventId {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| CoreError::InvalidEventId(s.to_string()))
	}
}

impl Serialize for EventId {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl<'de> Deserialize<'de> for EventId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		s.parse().map_err(serde::de::Error::custom)
	}
}

/// Stack trace containing frames ordered oldest call first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

/// A single annotated call site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
	#[serde(default)]
	pub filename: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub lineno: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub colno: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
	/// Derived from the filename
	#[serde(skip_serializing_if = "Option::is_none")]
	pub module: Option<String>,
	/// Application code, as opposed to runtime or dependency code
	#[serde(default)]
	pub in_app: bool,

	/// Up to 7 lines before the call site
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub pre_context: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub context_line: Option<String>,
	/// Up to 7 lines after the call site
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub post_context: Vec<String>,
}

impl Frame {
	pub fn has_context(&self) -> bool {
		self.context_line.is_some()
	}
}

/// Error information attached to an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
	#[serde(rename = "type")]
	pub exception_type: String,
	pub value: String,
	pub stacktrace: Stacktrace,
}

/// The unit of delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
	pub event_id: EventId,
	pub title: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	pub timestamp: DateTime<Utc>,
	pub platform: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub server_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub release: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub environment: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub logger: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub project: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub username: Option<String>,

	/// Innermost in-app frame, rendered as `module at function`
	#[serde(skip_serializing_if = "Option::is_none")]
	pub culprit: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exception: Vec<Exception>,

	#[serde(default)]
	pub tags: BTreeMap<String, String>,
	#[serde(default)]
	pub extra: serde_json::Map<String, serde_json::Value>,
	#[serde(default)]
	pub breadcrumbs: Vec<Breadcrumb>,
	/// Installed dependency versions, name to version
	#[serde(default)]
	pub modules: BTreeMap<String, String>,
}

impl Event {
	/// Creates an empty event stamped with the given id and the current time.
	pub fn new(event_id: EventId, title: impl Into<String>) -> Self {
		Self {
			event_id,
			title: title.into(),
			message: None,
			timestamp: Utc::now(),
			platform: DEFAULT_PLATFORM.to_string(),
			server_name: None,
			release: None,
			environment: None,
			logger: None,
			project: None,
			username: None,
			culprit: None,
			exception: Vec::new(),
			tags: BTreeMap::new(),
			extra: serde_json::Map::new(),
			breadcrumbs: Vec::new(),
			modules: BTreeMap::new(),
		}
	}

	/// Title used for exception events when no explicit message was given.
	pub fn exception_title(exception_type: &str, message: &str) -> String {
		if message.is_empty() {
			format!("{exception_type}: <no message>")
		} else {
			format!("{exception_type}: {message}")
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn event_id_roundtrip(uuid_bytes in any::<[u8; 16]>()) {
			let id = EventId(Uuid::from_bytes(uuid_bytes));
			let s = id.to_string();
			let parsed: EventId = s.parse().unwrap();
			prop_assert_eq!(id, parsed);
		}
	}

	#[test]
	fn event_id_is_32_lowercase_hex() {
		let id = EventId::new().to_string();
		assert_eq!(id.len(), 32);
		assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn event_id_serializes_without_hyphens() {
		let id = EventId::new();
		let json = serde_json::to_value(id).unwrap();
		assert_eq!(json, serde_json::Value::String(id.to_string()));
	}

	#[test]
	fn exception_title_handles_empty_message() {
		assert_eq!(Event::exception_title("TypeError", "x"), "TypeError: x");
		assert_eq!(Event::exception_title("Error", ""), "Error: <no message>");
	}

	#[test]
	fn frame_without_context_omits_context_fields() {
		let frame = Frame {
			filename: "/app/src/main.rs".to_string(),
			lineno: Some(3),
			..Default::default()
		};
		let json = serde_json::to_value(&frame).unwrap();
		assert!(json.get("pre_context").is_none());
		assert!(json.get("context_line").is_none());
		assert!(json.get("post_context").is_none());
		assert!(!frame.has_context());
	}

	#[test]
	fn exception_type_renamed_on_the_wire() {
		let exception = Exception {
			exception_type: "TypeError".to_string(),
			value: "x".to_string(),
			stacktrace: Stacktrace::default(),
		};
		let json = serde_json::to_value(&exception).unwrap();
		assert_eq!(json["type"], "TypeError");
	}

	#[test]
	fn new_event_defaults() {
		let event = Event::new(EventId::new(), "hello");
		assert_eq!(event.platform, DEFAULT_PLATFORM);
		assert!(event.exception.is_empty());
		assert!(event.culprit.is_none());
	}
}
