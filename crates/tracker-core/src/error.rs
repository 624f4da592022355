// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for tracker core types.

use thiserror::Error;

/// Errors raised while parsing or validating core tracker types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
	/// The DSN could not be turned into a capture target.
	#[error("invalid tracker DSN: {dsn} -> {reason}")]
	InvalidDsn { dsn: String, reason: String },

	#[error("invalid breadcrumb level: {0}")]
	InvalidBreadcrumbLevel(String),

	#[error("invalid event id: {0}")]
	InvalidEventId(String),
}

impl CoreError {
	pub(crate) fn invalid_dsn(dsn: &str, reason: impl Into<String>) -> Self {
		Self::InvalidDsn {
			dsn: dsn.to_string(),
			reason: reason.into(),
		}
	}
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
