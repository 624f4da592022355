// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Frame extraction: raw native stacks to ordered, source-annotated frames.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;
use tracker_core::Frame;

use crate::stack::RawFrame;

/// Lines of source context kept on each side of the call line.
pub const LINES_OF_CONTEXT: usize = 7;

/// Directories holding third-party code, with the number of path segments
/// after the marker that are not part of the module name.
const DEPENDENCY_DIRS: &[(&str, usize)] = &[
	("/.cargo/registry/src/", 1),
	("/.cargo/git/checkouts/", 0),
	("/vendor/", 0),
];

/// Path prefix of standard library sources in rustc-built binaries.
const RUNTIME_PATH_PREFIX: &str = "/rustc/";

/// Reads source files for context lines.
#[async_trait]
pub trait SourceReader: Send + Sync {
	async fn read_lines(&self, path: &Path) -> std::io::Result<Vec<String>>;
}

/// Reads source files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSourceReader;

#[async_trait]
impl SourceReader for FsSourceReader {
	async fn read_lines(&self, path: &Path) -> std::io::Result<Vec<String>> {
		let content = tokio::fs::read_to_string(path).await?;
		Ok(content.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect())
	}
}

/// Convert a raw stack into frames ordered oldest call first.
///
/// `None` or an empty stack yields no frames. Each distinct application file
/// is read at most once; all reads run concurrently and the result is only
/// assembled once every read has finished. Unreadable files leave the
/// affected frames without context.
pub async fn extract_frames(
	raw: Option<&[RawFrame]>,
	root: &Path,
	reader: &dyn SourceReader,
) -> Vec<Frame> {
	let Some(raw) = raw.filter(|r| !r.is_empty()) else {
		return Vec::new();
	};

	let root_prefix = root_prefix(root);

	let mut frames = Vec::with_capacity(raw.len());
	let mut internal = Vec::with_capacity(raw.len());
	for entry in raw.iter().rev() {
		let filename = entry.filename.clone().unwrap_or_default();
		let is_internal = is_internal(entry, &filename);

		let module = (!filename.is_empty()).then(|| module_name(&filename, &root_prefix));
		frames.push(Frame {
			in_app: !is_internal && !is_dependency_path(&filename),
			module,
			function: entry.function.clone(),
			lineno: entry.lineno,
			colno: entry.colno,
			filename,
			..Default::default()
		});
		internal.push(is_internal);
	}

	let mut wanted: Vec<&str> = frames
		.iter()
		.zip(&internal)
		.filter(|(_, internal)| !**internal)
		.map(|(f, _)| f.filename.as_str())
		.collect();
	wanted.sort_unstable();
	wanted.dedup();

	let reads = wanted.iter().map(|filename| async move {
		let path = resolve_path(filename, root);
		let lines = match reader.read_lines(&path).await {
			Ok(lines) => Some(Arc::new(lines)),
			Err(e) => {
				debug!(path = %path.display(), error = %e, "Could not read source for context");
				None
			}
		};
		(filename.to_string(), lines)
	});
	let sources: HashMap<String, Option<Arc<Vec<String>>>> = join_all(reads).await.into_iter().collect();

	for (frame, internal) in frames.iter_mut().zip(&internal) {
		if *internal {
			continue;
		}
		if let Some(Some(lines)) = sources.get(&frame.filename) {
			attach_context(frame, lines);
		}
	}

	frames
}

/// Runtime and unresolved frames never trigger file reads.
fn is_internal(entry: &RawFrame, filename: &str) -> bool {
	if entry.is_native || filename.is_empty() || filename.starts_with(RUNTIME_PATH_PREFIX) {
		return true;
	}
	if entry.function.as_deref().is_some_and(is_runtime_function) {
		return true;
	}
	!(filename.starts_with('/') || filename.starts_with('.') || is_windows_absolute(filename))
}

/// `C:\...`
fn is_windows_absolute(filename: &str) -> bool {
	filename.get(1..3) == Some(":\\")
}

/// Determine if a function belongs to the standard library or async runtime.
fn is_runtime_function(function: &str) -> bool {
	const RUNTIME_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"panic_unwind::",
		"<panic_unwind::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_",
	];

	RUNTIME_PREFIXES.iter().any(|p| function.starts_with(p))
}

fn is_dependency_path(filename: &str) -> bool {
	let normalized = filename.replace('\\', "/");
	DEPENDENCY_DIRS.iter().any(|(marker, _)| normalized.contains(marker))
}

/// Root directory rendered with forward slashes and a trailing `/`.
fn root_prefix(root: &Path) -> String {
	let mut prefix = root.display().to_string().replace('\\', "/");
	if !prefix.ends_with('/') {
		prefix.push('/');
	}
	prefix
}

fn resolve_path(filename: &str, root: &Path) -> PathBuf {
	let path = Path::new(filename);
	if path.is_absolute() || is_windows_absolute(filename) {
		path.to_path_buf()
	} else {
		root.join(path)
	}
}

/// Derive a module name from a source path.
///
/// Dependency code is named after its path inside the dependency directory,
/// application code after its path relative to the root; directory
/// separators become `.` and the file stem follows a `:`.
pub fn module_name(filename: &str, root_prefix: &str) -> String {
	let normalized = filename.replace('\\', "/");
	let (dir, file) = match normalized.rsplit_once('/') {
		Some((dir, file)) => (dir, file),
		None => ("", normalized.as_str()),
	};
	let stem = file.strip_suffix(".rs").unwrap_or(file);
	let dir_slash = format!("{dir}/");

	for (marker, skip) in DEPENDENCY_DIRS {
		if let Some(idx) = dir_slash.rfind(marker) {
			let inner = &dir_slash[idx + marker.len()..];
			let inner = inner.splitn(skip + 1, '/').last().unwrap_or_default();
			let inner = inner.trim_end_matches('/');
			return join_module(inner, stem);
		}
	}

	if dir_slash.starts_with(root_prefix) {
		let inner = dir.get(root_prefix.len()..).unwrap_or_default();
		return join_module(inner, stem);
	}

	stem.to_string()
}

fn join_module(dir: &str, stem: &str) -> String {
	if dir.is_empty() {
		stem.to_string()
	} else {
		format!("{}:{}", dir.replace('/', "."), stem)
	}
}

/// Attach up to [`LINES_OF_CONTEXT`] lines around the frame's line.
fn attach_context(frame: &mut Frame, lines: &[String]) {
	let Some(lineno) = frame.lineno.map(|l| l as usize).filter(|l| *l > 0) else {
		return;
	};
	let idx = lineno - 1;
	if idx >= lines.len() {
		return;
	}

	let start = idx.saturating_sub(LINES_OF_CONTEXT);
	let end = (lineno + LINES_OF_CONTEXT).min(lines.len());

	frame.pre_context = lines[start..idx].to_vec();
	frame.context_line = Some(lines[idx].clone());
	frame.post_context = lines[lineno..end].to_vec();
}
