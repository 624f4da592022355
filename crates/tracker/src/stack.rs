// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Raw stack capture and parsing.
//!
//! Raw frames are listed innermost call first, the way native backtraces
//! print them. The frame extractor reverses them.

use rustc_demangle::demangle;

/// One native stack entry before annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
	pub function: Option<String>,
	pub filename: Option<String>,
	pub lineno: Option<u32>,
	pub colno: Option<u32>,
	/// The symbol could not be resolved to a source location.
	pub is_native: bool,
}

impl RawFrame {
	/// A frame with a resolved source location.
	pub fn new(function: impl Into<String>, filename: impl Into<String>, lineno: u32, colno: u32) -> Self {
		Self {
			function: Some(function.into()),
			filename: Some(filename.into()),
			lineno: Some(lineno),
			colno: Some(colno),
			is_native: false,
		}
	}

	/// A frame for which only a symbol name is known.
	pub fn native(function: impl Into<String>) -> Self {
		Self {
			function: Some(function.into()),
			is_native: true,
			..Default::default()
		}
	}
}

/// Capture the current call stack using the `backtrace` crate.
///
/// Frames belonging to the capture machinery itself are dropped.
pub fn capture_raw_stack() -> Vec<RawFrame> {
	let backtrace = backtrace::Backtrace::new();
	let mut frames = Vec::new();

	for frame in backtrace.frames() {
		for symbol in frame.symbols() {
			let function = symbol.name().map(|n| format!("{:#}", n));
			let filename = symbol.filename().map(|p| p.display().to_string());
			frames.push(RawFrame {
				is_native: filename.is_none(),
				function,
				filename,
				lineno: symbol.lineno(),
				colno: symbol.colno(),
			});
		}
	}

	let skip = frames
		.iter()
		.position(|f| !is_capture_machinery(f.function.as_deref().unwrap_or_default()))
		.unwrap_or(0);
	frames.split_off(skip)
}

/// Parse a `std::backtrace::Backtrace` into raw frames.
pub fn parse_std_backtrace(backtrace: &std::backtrace::Backtrace) -> Vec<RawFrame> {
	parse_backtrace_text(&format!("{}", backtrace))
}

/// Parse the textual form of a backtrace.
///
/// Expects numbered symbol lines, each optionally followed by an
/// `at path:line:col` location line. Text without numbered lines (such as
/// "disabled backtrace") yields no frames.
pub fn parse_backtrace_text(text: &str) -> Vec<RawFrame> {
	let mut frames: Vec<RawFrame> = Vec::new();

	for line in text.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				if frame.filename.is_none() {
					apply_location(frame, location);
				}
			}
			continue;
		}

		if let Some(symbol) = strip_frame_number(line) {
			frames.push(RawFrame {
				function: Some(demangle(symbol).to_string()),
				is_native: true,
				..Default::default()
			});
		}
	}

	frames
}

/// Returns the symbol part of a `N: symbol` line.
fn strip_frame_number(line: &str) -> Option<&str> {
	let (prefix, rest) = line.split_once(':')?;
	prefix.trim().parse::<u32>().ok()?;
	let rest = rest.trim();
	(!rest.is_empty()).then_some(rest)
}

/// Fill in `path:line:col` from a location line. Splits from the right so
/// Windows drive letters survive.
fn apply_location(frame: &mut RawFrame, location: &str) {
	let mut parts = location.rsplitn(3, ':');
	let col = parts.next();
	let line = parts.next();
	let path = parts.next();

	match (path, line.and_then(|l| l.parse().ok()), col.and_then(|c| c.parse().ok())) {
		(Some(path), Some(lineno), Some(colno)) => {
			frame.filename = Some(path.to_string());
			frame.lineno = Some(lineno);
			frame.colno = Some(colno);
		}
		_ => {
			// Some locations carry only `path:line`
			let mut parts = location.rsplitn(2, ':');
			let line = parts.next().and_then(|l| l.parse().ok());
			match (parts.next(), line) {
				(Some(path), Some(lineno)) => {
					frame.filename = Some(path.to_string());
					frame.lineno = Some(lineno);
				}
				_ => frame.filename = Some(location.to_string()),
			}
		}
	}
	frame.is_native = false;
}

fn is_capture_machinery(function: &str) -> bool {
	const PREFIXES: &[&str] = &[
		"backtrace::",
		"<backtrace::",
		"tracker::stack::",
		"tracker::captured::",
		"tracker::hooks::",
		"<tracker::hooks::",
		"<alloc::boxed::Box<",
		"std::panicking::",
		"core::panicking::",
		"std::panic::",
		"std::sys::backtrace::",
		"std::sys_common::backtrace::",
		"rust_begin_unwind",
		"__rustc::rust_begin_unwind",
	];

	PREFIXES.iter().any(|p| function.starts_with(p))
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = "   0: my_app::handlers::load_user
             at ./src/handlers.rs:42:9
   1: my_app::main
             at /home/dev/my_app/src/main.rs:10:5
   2: core::ops::function::FnOnce::call_once
             at /rustc/90b35a6239c3d8bdabc530a6a0816f7ff89a0aaf/library/core/src/ops/function.rs:250:5
   3: __libc_start_main
   4: _start
";

	#[test]
	fn parses_symbols_and_locations() {
		let frames = parse_backtrace_text(SAMPLE);
		assert_eq!(frames.len(), 5);

		assert_eq!(frames[0].function.as_deref(), Some("my_app::handlers::load_user"));
		assert_eq!(frames[0].filename.as_deref(), Some("./src/handlers.rs"));
		assert_eq!(frames[0].lineno, Some(42));
		assert_eq!(frames[0].colno, Some(9));
		assert!(!frames[0].is_native);

		assert_eq!(frames[1].filename.as_deref(), Some("/home/dev/my_app/src/main.rs"));
		assert!(frames[3].is_native);
		assert!(frames[3].filename.is_none());
	}

	#[test]
	fn disabled_backtrace_has_no_frames() {
		assert!(parse_backtrace_text("disabled backtrace").is_empty());
		assert!(parse_backtrace_text("").is_empty());
	}

	#[test]
	fn windows_paths_keep_drive_letter() {
		let frames = parse_backtrace_text("  0: app::run\n     at C:\\work\\app\\src\\lib.rs:7:3\n");
		assert_eq!(frames[0].filename.as_deref(), Some("C:\\work\\app\\src\\lib.rs"));
		assert_eq!(frames[0].lineno, Some(7));
		assert_eq!(frames[0].colno, Some(3));
	}

	#[test]
	fn location_without_column() {
		let frames = parse_backtrace_text("  0: app::run\n     at src/lib.rs:7\n");
		assert_eq!(frames[0].filename.as_deref(), Some("src/lib.rs"));
		assert_eq!(frames[0].lineno, Some(7));
		assert_eq!(frames[0].colno, None);
	}

	#[test]
	fn mangled_symbols_are_demangled() {
		let frames = parse_backtrace_text("  0: _ZN4core9panicking5panic17h0123456789abcdefE\n");
		assert_eq!(frames[0].function.as_deref(), Some("core::panicking::panic::h0123456789abcdef"));
	}

	#[test]
	fn capture_raw_stack_skips_its_own_frames() {
		let frames = capture_raw_stack();
		// Frame contents depend on debug info; the capture machinery must never lead.
		if let Some(first) = frames.first() {
			assert!(!is_capture_machinery(first.function.as_deref().unwrap_or_default()));
		}
	}
}
