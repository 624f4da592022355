// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Culprit selection: the short fault locator shown alongside an event.

use crate::event::Frame;

/// Find the culprit for an oldest-first frame list.
///
/// Scans from the newest frame towards the oldest and returns the first
/// in-app frame, rendered by [`describe_frame`]. `None` when no frame is
/// in-app.
pub fn find_culprit(frames: &[Frame]) -> Option<String> {
	frames.iter().rev().find(|f| f.in_app).map(describe_frame)
}

/// Render a frame as `module at function`, with `?` for a missing half.
pub fn describe_frame(frame: &Frame) -> String {
	if frame.module.is_none() && frame.function.is_none() {
		return "<unknown>".to_string();
	}
	format!(
		"{} at {}",
		frame.module.as_deref().unwrap_or("?"),
		frame.function.as_deref().unwrap_or("?")
	)
}

/// Truncate a string to a maximum length with ellipsis.
pub fn truncate(s: &str, max_len: usize) -> String {
	if s.chars().count() <= max_len {
		s.to_string()
	} else {
		let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
		format!("{kept}...")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn frame(module: Option<&str>, function: Option<&str>, in_app: bool) -> Frame {
		Frame {
			module: module.map(str::to_string),
			function: function.map(str::to_string),
			in_app,
			..Default::default()
		}
	}

	#[test]
	fn picks_innermost_in_app_frame() {
		let frames = vec![
			frame(Some("app:main"), Some("main"), true),
			frame(Some("app.handlers:user"), Some("load_user"), true),
			frame(Some("tokio.src:task"), Some("poll"), false),
		];

		assert_eq!(
			find_culprit(&frames),
			Some("app.handlers:user at load_user".to_string())
		);
	}

	#[test]
	fn no_in_app_frames_means_no_culprit() {
		let frames = vec![frame(Some("std"), Some("rt"), false)];
		assert_eq!(find_culprit(&frames), None);
		assert_eq!(find_culprit(&[]), None);
	}

	#[test]
	fn missing_halves_render_as_question_marks() {
		assert_eq!(describe_frame(&frame(None, Some("f"), true)), "? at f");
		assert_eq!(describe_frame(&frame(Some("m"), None, true)), "m at ?");
		assert_eq!(describe_frame(&frame(None, None, true)), "<unknown>");
	}

	#[test]
	fn truncate_short_string() {
		assert_eq!(truncate("hello", 10), "hello");
	}

	#[test]
	fn truncate_long_string() {
		assert_eq!(truncate("hello world this is a long string", 15), "hello world ...");
	}
}
