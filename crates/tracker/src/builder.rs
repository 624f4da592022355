// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event construction: layering per-call overrides over the client context.

use std::collections::BTreeMap;

use serde_json::Value;
use tracker_core::{find_culprit, Breadcrumb, Event, EventId, Exception, Frame, Stacktrace};

use crate::captured::CapturedError;
use crate::options::ClientContext;

/// SDK version for identification.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
pub const SDK_NAME: &str = "tracker-rust";

/// Per-call values that take precedence over the client context.
#[derive(Debug, Clone, Default)]
pub struct CaptureOverrides {
	/// Explicit message. For exceptions this also replaces the derived title.
	pub message: Option<String>,
	pub culprit: Option<String>,
	pub server_name: Option<String>,
	pub release: Option<String>,
	pub environment: Option<String>,
	pub logger: Option<String>,
	pub username: Option<String>,
	/// Merged over the client tags, key by key.
	pub tags: BTreeMap<String, String>,
	/// Merged over the client extra data, key by key.
	pub extra: serde_json::Map<String, Value>,
	/// Request headers for this delivery only.
	pub headers: BTreeMap<String, String>,
}

impl CaptureOverrides {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());
		self
	}

	pub fn with_culprit(mut self, culprit: impl Into<String>) -> Self {
		self.culprit = Some(culprit.into());
		self
	}

	pub fn with_release(mut self, release: impl Into<String>) -> Self {
		self.release = Some(release.into());
		self
	}

	pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = Some(environment.into());
		self
	}

	pub fn with_username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
		self.extra.insert(key.into(), value);
		self
	}

	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}
}

/// What is being captured.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Capture<'a> {
	Message(&'a str),
	Exception(&'a CapturedError, &'a [Frame]),
}

/// Mutable client state snapshotted for one build.
#[derive(Debug, Default)]
pub(crate) struct Ambient {
	pub tags: BTreeMap<String, String>,
	pub extra: serde_json::Map<String, Value>,
	pub breadcrumbs: Vec<Breadcrumb>,
	pub modules: BTreeMap<String, String>,
}

/// Build an event. Precedence is override, then context, then default.
pub(crate) fn build_event(
	event_id: EventId,
	capture: Capture<'_>,
	context: &ClientContext,
	overrides: &CaptureOverrides,
	ambient: Ambient,
) -> Event {
	let title = match capture {
		Capture::Message(text) => text.to_string(),
		Capture::Exception(error, _) => match &overrides.message {
			Some(message) => message.clone(),
			None => Event::exception_title(error.type_name(), error.message()),
		},
	};

	let mut event = Event::new(event_id, title);
	event.message = overrides.message.clone();
	event.platform = context.platform.clone();

	event.server_name = pick(&overrides.server_name, &Some(context.server_name.clone()));
	event.release = pick(&overrides.release, &context.release);
	event.environment = pick(&overrides.environment, &context.environment);
	event.logger = pick(&overrides.logger, &context.logger);
	event.username = pick(&overrides.username, &context.username);
	event.project = context.project.clone();

	let mut tags = ambient.tags;
	tags.extend(context.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
	tags.extend(overrides.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
	tags.insert("sdk.name".to_string(), SDK_NAME.to_string());
	tags.insert("sdk.version".to_string(), SDK_VERSION.to_string());
	event.tags = tags;

	let mut extra = ambient.extra;
	extra.extend(context.extra.iter().map(|(k, v)| (k.clone(), v.clone())));
	extra.extend(overrides.extra.iter().map(|(k, v)| (k.clone(), v.clone())));

	if let Capture::Exception(error, frames) = capture {
		if !error.properties().is_empty() {
			extra.insert(error.type_name().to_string(), Value::Object(error.properties().clone()));
		}
		event.culprit = overrides.culprit.clone().or_else(|| find_culprit(frames));
		event.exception = vec![Exception {
			exception_type: error.type_name().to_string(),
			value: error.message().to_string(),
			stacktrace: Stacktrace {
				frames: frames.to_vec(),
			},
		}];
	} else {
		event.culprit = overrides.culprit.clone();
	}

	event.extra = extra;
	event.breadcrumbs = ambient.breadcrumbs;
	event.modules = ambient.modules;
	event
}

fn pick(first: &Option<String>, second: &Option<String>) -> Option<String> {
	first
		.as_ref()
		.filter(|v| !v.is_empty())
		.or(second.as_ref().filter(|v| !v.is_empty()))
		.cloned()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::options::TrackerOptions;
	use serde_json::json;

	fn context() -> ClientContext {
		ClientContext::from_options(
			TrackerOptions::new()
				.server_name("web-1")
				.root("/srv/app")
				.release("1.0.0")
				.environment("production")
				.logger("api")
				.tag("region", "eu")
				.tag("tier", "gold")
				.extra("build", json!(42)),
		)
	}

	fn app_frame(module: &str, function: &str) -> Frame {
		Frame {
			filename: "/srv/app/src/lib.rs".to_string(),
			module: Some(module.to_string()),
			function: Some(function.to_string()),
			in_app: true,
			..Default::default()
		}
	}

	#[test]
	fn message_event_uses_context_defaults() {
		let id = EventId::new();
		let event = build_event(
			id,
			Capture::Message("hello"),
			&context(),
			&CaptureOverrides::default(),
			Ambient::default(),
		);

		assert_eq!(event.event_id, id);
		assert_eq!(event.title, "hello");
		assert_eq!(event.message, None);
		assert_eq!(event.server_name.as_deref(), Some("web-1"));
		assert_eq!(event.release.as_deref(), Some("1.0.0"));
		assert_eq!(event.logger.as_deref(), Some("api"));
		assert!(event.exception.is_empty());
		assert_eq!(event.tags["sdk.name"], SDK_NAME);
		assert_eq!(event.tags["region"], "eu");
		assert_eq!(event.extra["build"], 42);
	}

	#[test]
	fn overrides_win_per_key() {
		let overrides = CaptureOverrides::new()
			.with_release("2.0.0")
			.with_tag("region", "us")
			.with_extra("request", json!("GET /"));

		let event = build_event(
			EventId::new(),
			Capture::Message("hello"),
			&context(),
			&overrides,
			Ambient::default(),
		);

		assert_eq!(event.release.as_deref(), Some("2.0.0"));
		assert_eq!(event.environment.as_deref(), Some("production"));
		assert_eq!(event.tags["region"], "us");
		assert_eq!(event.tags["tier"], "gold");
		assert_eq!(event.extra["request"], "GET /");
		assert_eq!(event.extra["build"], 42);
	}

	#[test]
	fn context_tags_win_over_runtime_tags() {
		let ambient = Ambient {
			tags: BTreeMap::from([
				("region".to_string(), "ap".to_string()),
				("pod".to_string(), "a1".to_string()),
			]),
			..Default::default()
		};

		let event = build_event(
			EventId::new(),
			Capture::Message("hello"),
			&context(),
			&CaptureOverrides::default(),
			ambient,
		);

		assert_eq!(event.tags["region"], "eu");
		assert_eq!(event.tags["pod"], "a1");
	}

	#[test]
	fn exception_event_has_title_culprit_and_properties() {
		let error = CapturedError::new("TypeError", "x")
			.with_stack(None)
			.with_property("code", 7);
		let frames = vec![
			app_frame("src:main", "main"),
			app_frame("src.handlers:user", "load_user"),
			Frame {
				filename: "/rustc/abc/library/core/src/ops/function.rs".to_string(),
				..Default::default()
			},
		];

		let event = build_event(
			EventId::new(),
			Capture::Exception(&error, &frames),
			&context(),
			&CaptureOverrides::default(),
			Ambient::default(),
		);

		assert_eq!(event.title, "TypeError: x");
		assert_eq!(event.exception.len(), 1);
		assert_eq!(event.exception[0].exception_type, "TypeError");
		assert_eq!(event.exception[0].stacktrace.frames.len(), 3);
		assert_eq!(event.culprit.as_deref(), Some("src.handlers:user at load_user"));
		assert_eq!(event.extra["TypeError"], json!({"code": 7}));
	}

	#[test]
	fn exception_without_message_or_in_app_frames() {
		let error = CapturedError::new("Error", "").with_stack(None);
		let event = build_event(
			EventId::new(),
			Capture::Exception(&error, &[]),
			&context(),
			&CaptureOverrides::default(),
			Ambient::default(),
		);

		assert_eq!(event.title, "Error: <no message>");
		assert_eq!(event.culprit, None);
		assert!(!event.extra.contains_key("Error"));
	}

	#[test]
	fn explicit_message_replaces_exception_title() {
		let error = CapturedError::new("TypeError", "x").with_stack(None);
		let overrides = CaptureOverrides::new()
			.with_message("checkout failed")
			.with_culprit("checkout");

		let event = build_event(
			EventId::new(),
			Capture::Exception(&error, &[app_frame("src:main", "main")]),
			&context(),
			&overrides,
			Ambient::default(),
		);

		assert_eq!(event.title, "checkout failed");
		assert_eq!(event.message.as_deref(), Some("checkout failed"));
		assert_eq!(event.culprit.as_deref(), Some("checkout"));
	}

	#[test]
	fn breadcrumbs_and_modules_are_stamped() {
		let ambient = Ambient {
			breadcrumbs: vec![Breadcrumb::new("http", "GET /")],
			modules: BTreeMap::from([("serde".to_string(), "1.0.200".to_string())]),
			..Default::default()
		};

		let event = build_event(
			EventId::new(),
			Capture::Message("hello"),
			&context(),
			&CaptureOverrides::default(),
			ambient,
		);

		assert_eq!(event.breadcrumbs.len(), 1);
		assert_eq!(event.modules["serde"], "1.0.200");
	}
}
