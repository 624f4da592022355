// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! File-based setup: reads tracker settings from TOML and starts a client.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use crate::client::{CrashCallback, Tracker};
use crate::error::{Result, TrackerError};
use crate::options::TrackerOptions;

/// Environment variables layered over file settings.
pub const ENV_DSN: &str = "TRACKER_DSN";
pub const ENV_ACTIVE: &str = "TRACKER_ACTIVE";
pub const ENV_ENVIRONMENT: &str = "TRACKER_ENVIRONMENT";
pub const ENV_RELEASE: &str = "TRACKER_RELEASE";

/// Tracker settings as found in a configuration file.
///
/// ```toml
/// active = true
/// dsn = "https://collector.example.com/hook/capture-errors/abc123"
///
/// [options]
/// release = "1.4.0"
/// sampleRate = 0.5
/// captureUnhandledRejections = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
	#[serde(default = "default_active")]
	pub active: bool,
	#[serde(default)]
	pub dsn: Option<String>,
	#[serde(default)]
	pub options: TrackerOptions,
}

fn default_active() -> bool {
	true
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			active: true,
			dsn: None,
			options: TrackerOptions::default(),
		}
	}
}

impl TrackerConfig {
	pub fn from_toml_str(content: &str) -> Result<Self> {
		toml::from_str(content).map_err(|e| TrackerError::Config(e.to_string()))
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path)
			.map_err(|e| TrackerError::Config(format!("failed to read {}: {e}", path.display())))?;
		Self::from_toml_str(&content)
	}

	/// Apply `TRACKER_*` variables from the process environment.
	pub fn with_env_overrides(self) -> Self {
		self.with_overrides(|key| std::env::var(key).ok())
	}

	/// Apply overrides from any key lookup. Unparsable booleans are ignored.
	pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
		if let Some(dsn) = lookup(ENV_DSN) {
			self.dsn = Some(dsn);
		}
		if let Some(active) = lookup(ENV_ACTIVE).and_then(|v| parse_bool(&v)) {
			self.active = active;
		}
		if let Some(environment) = lookup(ENV_ENVIRONMENT) {
			self.options.environment = Some(environment);
		}
		if let Some(release) = lookup(ENV_RELEASE) {
			self.options.release = Some(release);
		}
		self
	}
}

fn parse_bool(value: &str) -> Option<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" | "on" => Some(true),
		"0" | "false" | "no" | "off" => Some(false),
		_ => None,
	}
}

/// Configure and install a client from file settings.
///
/// Inactive settings or a missing DSN start nothing and return `Ok(None)`.
/// An invalid DSN is an error.
pub fn init_from_config(config: TrackerConfig, callback: Option<CrashCallback>) -> Result<Option<Tracker>> {
	if !config.active {
		info!("Tracker inactive, skipping setup");
		return Ok(None);
	}

	let Some(dsn) = config.dsn.as_deref().filter(|d| !d.trim().is_empty()) else {
		error!("Tracker requires a DSN in its configuration");
		return Ok(None);
	};

	let tracker = Tracker::new()?;
	tracker.configure(Some(dsn), config.options)?.install(callback);
	info!("Tracker started");
	Ok(Some(tracker))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn parses_file_with_camel_case_options() {
		let config = TrackerConfig::from_toml_str(
			r#"
dsn = "https://collector.example.com/hook/capture-errors/abc"

[options]
release = "1.4.0"
loggerName = "api"
sampleRate = 0.5
captureUnhandledRejections = true

[options.tags]
region = "eu"
"#,
		)
		.unwrap();

		assert!(config.active);
		assert_eq!(config.dsn.as_deref(), Some("https://collector.example.com/hook/capture-errors/abc"));
		assert_eq!(config.options.logger.as_deref(), Some("api"));
		assert_eq!(config.options.sample_rate, Some(0.5));
		assert!(config.options.capture_unhandled_rejections);
		assert_eq!(config.options.tags["region"], "eu");
	}

	#[test]
	fn invalid_toml_is_a_config_error() {
		let err = TrackerConfig::from_toml_str("dsn = ").unwrap_err();
		assert!(matches!(err, TrackerError::Config(_)));
	}

	#[test]
	fn loads_from_disk() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("tracker.toml");
		std::fs::write(&path, "active = false\n").unwrap();

		let config = TrackerConfig::load(&path).unwrap();
		assert!(!config.active);
		assert!(TrackerConfig::load(dir.path().join("missing.toml")).is_err());
	}

	#[test]
	fn overrides_layer_over_file() {
		let vars = HashMap::from([
			(ENV_DSN, "http://localhost/hook/capture-errors/env"),
			(ENV_ACTIVE, "off"),
			(ENV_RELEASE, "2.0.0"),
		]);
		let config = TrackerConfig::default().with_overrides(|key| vars.get(key).map(|v| v.to_string()));

		assert_eq!(config.dsn.as_deref(), Some("http://localhost/hook/capture-errors/env"));
		assert!(!config.active);
		assert_eq!(config.options.release.as_deref(), Some("2.0.0"));
		assert_eq!(config.options.environment, None);
	}

	#[test]
	fn inactive_or_dsn_less_config_starts_nothing() {
		let inactive = TrackerConfig {
			active: false,
			dsn: Some("http://localhost/hook/capture-errors/x".to_string()),
			..Default::default()
		};
		assert!(init_from_config(inactive, None).unwrap().is_none());
		assert!(init_from_config(TrackerConfig::default(), None).unwrap().is_none());
	}

	#[test]
	fn invalid_dsn_fails_setup() {
		let config = TrackerConfig {
			dsn: Some("ftp://localhost/hook/capture-errors/x".to_string()),
			..Default::default()
		};
		assert!(matches!(
			init_from_config(config, None),
			Err(TrackerError::InvalidDsn { .. })
		));
	}
}
