// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the tracker SDK.

use std::sync::Arc;

use thiserror::Error;
use tracker_core::{CoreError, EventId};

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Errors that can occur in the tracker SDK.
///
/// Only configuration errors are returned synchronously. Everything else is
/// local to one capture and reaches the caller through the capture's outcome
/// and the client's signal channel.
#[derive(Debug, Clone, Error)]
pub enum TrackerError {
	/// The DSN could not be parsed into a capture target.
	#[error("invalid tracker DSN: {dsn} -> {reason}")]
	InvalidDsn { dsn: String, reason: String },

	/// Configuration input could not be read or parsed.
	#[error("configuration error: {0}")]
	Config(String),

	/// Connection refused, timeout, DNS failure.
	#[error("HTTP request failed for event {event_id}: {source}")]
	Transport {
		event_id: EventId,
		#[source]
		source: Arc<reqwest::Error>,
	},

	/// The endpoint answered without confirming success.
	#[error("HTTP Request Error ({status}): {message}")]
	RemoteRejection {
		event_id: EventId,
		status: u16,
		message: String,
		/// Parsed response body.
		response: serde_json::Value,
	},

	/// The response neither confirmed nor rejected the event.
	#[error("no delivery verdict for event {event_id} (status {status})")]
	NoVerdict { event_id: EventId, status: u16 },

	/// The event could not be serialized.
	#[error("serialization error: {0}")]
	Serialization(Arc<serde_json::Error>),

	/// The serialized event could not be compressed.
	#[error("compression error: {0}")]
	Compression(Arc<std::io::Error>),

	/// The delivery task ended without reporting an outcome.
	#[error("delivery of event {event_id} was abandoned")]
	Abandoned { event_id: EventId },

	/// Lock acquisition failed.
	#[error("failed to acquire lock")]
	LockError,
}

impl TrackerError {
	/// Event the error relates to, when it comes from a delivery attempt.
	pub fn event_id(&self) -> Option<EventId> {
		match self {
			Self::Transport { event_id, .. }
			| Self::RemoteRejection { event_id, .. }
			| Self::NoVerdict { event_id, .. }
			| Self::Abandoned { event_id } => Some(*event_id),
			_ => None,
		}
	}

	/// HTTP status returned by the endpoint, if one was received.
	pub fn status_code(&self) -> Option<u16> {
		match self {
			Self::RemoteRejection { status, .. } | Self::NoVerdict { status, .. } => Some(*status),
			Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
			_ => None,
		}
	}

	/// Parsed response body for remote rejections.
	pub fn response(&self) -> Option<&serde_json::Value> {
		match self {
			Self::RemoteRejection { response, .. } => Some(response),
			_ => None,
		}
	}

	/// Whether this outcome should be announced on the signal channel.
	///
	/// Responses without a verdict stay silent.
	pub(crate) fn is_signalled(&self) -> bool {
		!matches!(self, Self::NoVerdict { .. })
	}
}

impl From<CoreError> for TrackerError {
	fn from(err: CoreError) -> Self {
		match err {
			CoreError::InvalidDsn { dsn, reason } => Self::InvalidDsn { dsn, reason },
			other => Self::Config(other.to_string()),
		}
	}
}

impl From<serde_json::Error> for TrackerError {
	fn from(err: serde_json::Error) -> Self {
		Self::Serialization(Arc::new(err))
	}
}

impl From<std::io::Error> for TrackerError {
	fn from(err: std::io::Error) -> Self {
		Self::Compression(Arc::new(err))
	}
}
