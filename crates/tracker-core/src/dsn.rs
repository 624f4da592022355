// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Parsing of the configured destination URL into a capture target.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{CoreError, Result};

/// Route segment every collection endpoint must expose.
pub const CAPTURE_ROUTE: &str = "hook/capture-errors/";

/// Wire protocol used to reach the collection endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
	Http,
	Https,
}

impl Protocol {
	/// Index used to select the transport implementation (0 = http, 1 = https).
	pub fn index(self) -> usize {
		match self {
			Self::Http => 0,
			Self::Https => 1,
		}
	}

	pub fn default_port(self) -> u16 {
		match self {
			Self::Http => 80,
			Self::Https => 443,
		}
	}

	pub fn scheme(self) -> &'static str {
		match self {
			Self::Http => "http",
			Self::Https => "https",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.scheme())
	}
}

/// A parsed DSN: where captured events are delivered.
///
/// Parsing happens once at configuration time; a malformed DSN is a
/// configuration error, never a runtime retry condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dsn {
	hostname: String,
	/// Path plus query string, always starting with `/`.
	path: String,
	port: u16,
	protocol: Protocol,
}

impl Dsn {
	/// Parses a DSN such as `https://collector.example.com/hook/capture-errors/abc123`.
	///
	/// The scheme is validated before the route segment, so a DSN failing both
	/// checks reports the protocol problem.
	pub fn parse(dsn: &str) -> Result<Self> {
		if !dsn.contains("http") {
			return Err(CoreError::invalid_dsn(dsn, "Invalid Protocol Http transport tracker"));
		}

		let url = Url::parse(dsn).map_err(|e| CoreError::invalid_dsn(dsn, e.to_string()))?;

		let protocol = match url.scheme() {
			"http" => Protocol::Http,
			"https" => Protocol::Https,
			other => {
				return Err(CoreError::invalid_dsn(
					dsn,
					format!("Invalid Protocol Http transport tracker: unsupported scheme `{other}`"),
				))
			}
		};

		if !url.path().contains(CAPTURE_ROUTE) {
			return Err(CoreError::invalid_dsn(
				dsn,
				"Invalid Route Path transport Capture tracker",
			));
		}

		let hostname = url
			.host_str()
			.filter(|h| !h.is_empty())
			.ok_or_else(|| CoreError::invalid_dsn(dsn, "missing host"))?
			.to_string();

		let mut path = url.path().to_string();
		if let Some(query) = url.query() {
			path.push('?');
			path.push_str(query);
		}

		Ok(Self {
			hostname,
			path,
			port: url.port().unwrap_or_else(|| protocol.default_port()),
			protocol,
		})
	}

	pub fn hostname(&self) -> &str {
		&self.hostname
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	pub fn protocol(&self) -> Protocol {
		self.protocol
	}

	pub fn protocol_index(&self) -> usize {
		self.protocol.index()
	}

	/// Reconstructs the full endpoint URL, always with an explicit port.
	pub fn url(&self) -> String {
		format!(
			"{}://{}:{}{}",
			self.protocol.scheme(),
			self.hostname,
			self.port,
			self.path
		)
	}
}

impl FromStr for Dsn {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self> {
		Self::parse(s)
	}
}

impl fmt::Display for Dsn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.url())
	}
}
