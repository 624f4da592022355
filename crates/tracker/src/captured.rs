// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured error model handed to the capture pipeline.

use std::fmt;
use std::panic::PanicHookInfo;

use serde_json::Value;

use crate::stack::{capture_raw_stack, parse_std_backtrace, RawFrame};

/// Type name used when a non-error value is captured.
pub const SYNTHETIC_ERROR_TYPE: &str = "Error";
/// Type name used for panics.
pub const PANIC_ERROR_TYPE: &str = "Panic";

/// An error ready to be captured: type, message, raw stack and any extra
/// properties the caller wants attached.
///
/// Properties end up in the event's `extra` data under the type name.
#[derive(Debug, Clone)]
pub struct CapturedError {
	type_name: String,
	message: String,
	stack: Option<Vec<RawFrame>>,
	properties: serde_json::Map<String, Value>,
}

impl CapturedError {
	/// Creates an error with an explicit type name, capturing the current stack.
	pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			type_name: type_name.into(),
			message: message.into(),
			stack: Some(capture_raw_stack()),
			properties: serde_json::Map::new(),
		}
	}

	/// Captures any `std::error::Error`.
	///
	/// The type name comes from the Rust type and the `source()` chain is
	/// recorded under the `causes` property.
	pub fn from_error<E>(err: &E) -> Self
	where
		E: std::error::Error + ?Sized,
	{
		let mut captured = Self::new(short_type_name(std::any::type_name::<E>()), err.to_string());

		let causes: Vec<Value> = std::iter::successors(err.source(), |e| e.source())
			.map(|e| Value::String(e.to_string()))
			.collect();
		if !causes.is_empty() {
			captured.properties.insert("causes".to_string(), Value::Array(causes));
		}

		captured
	}

	/// Wraps a value that is not an error (a string, a number, ...) into a
	/// synthetic error so a best-effort stack can still be extracted.
	pub fn from_value(value: impl fmt::Display) -> Self {
		Self::new(SYNTHETIC_ERROR_TYPE, value.to_string())
	}

	/// Builds an error from a panic, as seen from a panic hook.
	pub fn from_panic(info: &PanicHookInfo<'_>) -> Self {
		let mut captured = Self::new(PANIC_ERROR_TYPE, panic_message(info.payload()));
		if let Some(location) = info.location() {
			captured = captured
				.with_property("file", location.file())
				.with_property("line", location.line())
				.with_property("column", location.column());
		}
		captured
	}

	/// Attaches an explicit property.
	pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.properties.insert(key.into(), value.into());
		self
	}

	/// Replaces the raw stack. `None` means no stack is available.
	pub fn with_stack(mut self, stack: Option<Vec<RawFrame>>) -> Self {
		self.stack = stack;
		self
	}

	/// Uses a backtrace the error carried itself instead of the capture site's.
	pub fn with_std_backtrace(self, backtrace: &std::backtrace::Backtrace) -> Self {
		self.with_stack(Some(parse_std_backtrace(backtrace)))
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	pub fn stack(&self) -> Option<&[RawFrame]> {
		self.stack.as_deref()
	}

	pub fn properties(&self) -> &serde_json::Map<String, Value> {
		&self.properties
	}
}

impl fmt::Display for CapturedError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}: {}", self.type_name, self.message)
	}
}

/// Extract the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}

/// `my_app::errors::ParseError<T>` -> `ParseError`
fn short_type_name(full: &str) -> String {
	let full = full.trim_start_matches("dyn ");
	let base = full.split('<').next().unwrap_or(full);
	let short = base.rsplit("::").next().unwrap_or(base).trim();
	if short.is_empty() {
		SYNTHETIC_ERROR_TYPE.to_string()
	} else {
		short.to_string()
	}
}
