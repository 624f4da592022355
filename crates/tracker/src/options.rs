// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client options and the context resolved from them at configure time.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracker_core::{Breadcrumb, Event, DEFAULT_PLATFORM};

/// Transforms an event before the send decision.
pub type DataCallback = Arc<dyn Fn(Event) -> Event + Send + Sync>;

/// Decides whether an event is sent. Returning `false` suppresses it.
pub type ShouldSendCallback = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Options accepted by [`Tracker::configure`](crate::Tracker::configure).
///
/// Deserializable from configuration files; callbacks can only be set in
/// code.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
	/// Headers sent with every delivery.
	pub headers: BTreeMap<String, String>,
	pub release: Option<String>,
	pub environment: Option<String>,
	#[serde(alias = "loggerName")]
	pub logger: Option<String>,
	#[serde(alias = "projectId")]
	pub project_id: Option<String>,
	/// Fraction of events sent, clamped into `[0, 1]`. Defaults to 1.
	#[serde(alias = "sampleRate")]
	pub sample_rate: Option<f64>,
	#[serde(alias = "captureUnhandledRejections")]
	pub capture_unhandled_rejections: bool,
	/// Logs installation details and outgoing payloads.
	pub debug: bool,
	pub tags: BTreeMap<String, String>,
	pub extra: serde_json::Map<String, serde_json::Value>,
	#[serde(alias = "serverName")]
	pub server_name: Option<String>,
	/// Application root used for module names and relative source paths.
	pub root: Option<PathBuf>,
	pub username: Option<String>,
	pub platform: Option<String>,
	/// Breadcrumbs present on every event from the start.
	pub breadcrumbs: Vec<Breadcrumb>,

	#[serde(skip)]
	pub data_callback: Option<DataCallback>,
	#[serde(skip)]
	pub should_send_callback: Option<ShouldSendCallback>,
}

impl TrackerOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());
		self
	}

	pub fn release(mut self, release: impl Into<String>) -> Self {
		self.release = Some(release.into());
		self
	}

	pub fn environment(mut self, environment: impl Into<String>) -> Self {
		self.environment = Some(environment.into());
		self
	}

	pub fn logger(mut self, logger: impl Into<String>) -> Self {
		self.logger = Some(logger.into());
		self
	}

	pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
		self.project_id = Some(project_id.into());
		self
	}

	pub fn sample_rate(mut self, rate: f64) -> Self {
		self.sample_rate = Some(rate);
		self
	}

	pub fn capture_unhandled_rejections(mut self, enabled: bool) -> Self {
		self.capture_unhandled_rejections = enabled;
		self
	}

	pub fn debug(mut self, enabled: bool) -> Self {
		self.debug = enabled;
		self
	}

	pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.tags.insert(key.into(), value.into());
		self
	}

	pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.extra.insert(key.into(), value);
		self
	}

	pub fn server_name(mut self, name: impl Into<String>) -> Self {
		self.server_name = Some(name.into());
		self
	}

	pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
		self.root = Some(root.into());
		self
	}

	pub fn username(mut self, username: impl Into<String>) -> Self {
		self.username = Some(username.into());
		self
	}

	pub fn platform(mut self, platform: impl Into<String>) -> Self {
		self.platform = Some(platform.into());
		self
	}

	pub fn breadcrumb(mut self, breadcrumb: Breadcrumb) -> Self {
		self.breadcrumbs.push(breadcrumb);
		self
	}

	/// Sets a callback that may rewrite each event before it is sent.
	///
	/// A panic inside the callback is logged and the event proceeds
	/// unmodified.
	pub fn data_callback<F>(mut self, f: F) -> Self
	where
		F: Fn(Event) -> Event + Send + Sync + 'static,
	{
		self.data_callback = Some(Arc::new(f));
		self
	}

	/// Sets a callback deciding whether each event is sent.
	///
	/// A panic inside the callback suppresses the event.
	pub fn should_send_callback<F>(mut self, f: F) -> Self
	where
		F: Fn(&Event) -> bool + Send + Sync + 'static,
	{
		self.should_send_callback = Some(Arc::new(f));
		self
	}
}

impl fmt::Debug for TrackerOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TrackerOptions")
			.field("headers", &self.headers.keys().collect::<Vec<_>>())
			.field("release", &self.release)
			.field("environment", &self.environment)
			.field("logger", &self.logger)
			.field("project_id", &self.project_id)
			.field("sample_rate", &self.sample_rate)
			.field("capture_unhandled_rejections", &self.capture_unhandled_rejections)
			.field("debug", &self.debug)
			.field("server_name", &self.server_name)
			.field("root", &self.root)
			.field("data_callback", &self.data_callback.is_some())
			.field("should_send_callback", &self.should_send_callback.is_some())
			.finish_non_exhaustive()
	}
}

/// Everything a capture needs from configuration, fixed at configure time.
#[derive(Clone)]
pub struct ClientContext {
	pub server_name: String,
	pub root: PathBuf,
	pub headers: BTreeMap<String, String>,
	pub release: Option<String>,
	pub environment: Option<String>,
	pub logger: Option<String>,
	pub username: Option<String>,
	pub project: Option<String>,
	pub platform: String,
	pub sample_rate: f64,
	pub debug: bool,
	pub capture_unhandled_rejections: bool,
	pub tags: BTreeMap<String, String>,
	pub extra: serde_json::Map<String, serde_json::Value>,
	pub data_callback: Option<DataCallback>,
	pub should_send_callback: Option<ShouldSendCallback>,
}

impl ClientContext {
	/// Resolve options against the process environment.
	///
	/// Initial breadcrumbs are not part of the context; the client moves
	/// them into its own trail.
	pub fn from_options(options: TrackerOptions) -> Self {
		Self {
			server_name: options.server_name.filter(|s| !s.is_empty()).unwrap_or_else(hostname),
			root: options
				.root
				.or_else(|| std::env::current_dir().ok())
				.unwrap_or_else(|| PathBuf::from(".")),
			headers: options.headers,
			release: non_empty(options.release),
			environment: non_empty(options.environment),
			logger: non_empty(options.logger),
			username: non_empty(options.username),
			project: non_empty(options.project_id),
			platform: options
				.platform
				.filter(|p| !p.is_empty())
				.unwrap_or_else(|| DEFAULT_PLATFORM.to_string()),
			sample_rate: clamp_sample_rate(options.sample_rate),
			debug: options.debug,
			capture_unhandled_rejections: options.capture_unhandled_rejections,
			tags: options.tags,
			extra: options.extra,
			data_callback: options.data_callback,
			should_send_callback: options.should_send_callback,
		}
	}
}

impl Default for ClientContext {
	fn default() -> Self {
		Self::from_options(TrackerOptions::default())
	}
}

impl fmt::Debug for ClientContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ClientContext")
			.field("server_name", &self.server_name)
			.field("root", &self.root)
			.field("release", &self.release)
			.field("environment", &self.environment)
			.field("platform", &self.platform)
			.field("sample_rate", &self.sample_rate)
			.finish_non_exhaustive()
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.filter(|v| !v.is_empty())
}

/// Missing or NaN rates send everything.
fn clamp_sample_rate(rate: Option<f64>) -> f64 {
	match rate {
		Some(r) if !r.is_nan() => r.clamp(0.0, 1.0),
		_ => 1.0,
	}
}

/// The machine's host name, or empty when the OS does not report one.
fn hostname() -> String {
	hostname::get()
		.ok()
		.and_then(|h| h.into_string().ok())
		.unwrap_or_default()
}
