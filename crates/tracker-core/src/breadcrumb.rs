// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs: markers of prior application activity attached to events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A breadcrumb recorded by the application before an event was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
	#[serde(default = "Utc::now")]
	pub timestamp: DateTime<Utc>,
	/// "http", "navigation", "query", "console"
	#[serde(default)]
	pub category: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default)]
	pub level: BreadcrumbLevel,
	#[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
	pub data: serde_json::Map<String, serde_json::Value>,
}

impl Breadcrumb {
	pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			category: category.into(),
			message: Some(message.into()),
			..Default::default()
		}
	}

	pub fn with_level(mut self, level: BreadcrumbLevel) -> Self {
		self.level = level;
		self
	}

	pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
		self.data.insert(key.into(), value);
		self
	}
}

impl Default for Breadcrumb {
	fn default() -> Self {
		Self {
			timestamp: Utc::now(),
			category: String::new(),
			message: None,
			level: BreadcrumbLevel::Info,
			data: serde_json::Map::new(),
		}
	}
}

/// Severity level of a breadcrumb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadcrumbLevel {
	Debug,
	#[default]
	Info,
	Warning,
	Error,
	Fatal,
}

impl fmt::Display for BreadcrumbLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Debug => write!(f, "debug"),
			Self::Info => write!(f, "info"),
			Self::Warning => write!(f, "warning"),
			Self::Error => write!(f, "error"),
			Self::Fatal => write!(f, "fatal"),
		}
	}
}

impl FromStr for BreadcrumbLevel {
	type Err = CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"debug" => Ok(Self::Debug),
			"info" => Ok(Self::Info),
			"warning" | "warn" => Ok(Self::Warning),
			"error" => Ok(Self::Error),
			"fatal" => Ok(Self::Fatal),
			_ => Err(CoreError::InvalidBreadcrumbLevel(s.to_string())),
		}
	}
}
