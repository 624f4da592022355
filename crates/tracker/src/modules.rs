// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Module inventory: installed dependency names and versions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

/// At most this many modules are attached to an event.
pub const MAX_MODULES: usize = 16;

/// Supplies the dependency inventory attached to events.
///
/// Called at most once per client; the result is cached.
pub trait ModuleSource: Send + Sync {
	fn modules(&self, root: &Path) -> BTreeMap<String, String>;
}

/// Reads package names and versions from `Cargo.lock` beneath the root.
#[derive(Debug, Clone, Default)]
pub struct CargoLockSource {
	/// Explicit lock file, overriding `<root>/Cargo.lock`.
	path: Option<PathBuf>,
}

impl CargoLockSource {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_path(path: impl Into<PathBuf>) -> Self {
		Self {
			path: Some(path.into()),
		}
	}
}

#[derive(Debug, Deserialize)]
struct LockFile {
	#[serde(default)]
	package: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
	name: String,
	version: String,
}

impl ModuleSource for CargoLockSource {
	fn modules(&self, root: &Path) -> BTreeMap<String, String> {
		let path = self.path.clone().unwrap_or_else(|| root.join("Cargo.lock"));

		let content = match std::fs::read_to_string(&path) {
			Ok(content) => content,
			Err(e) => {
				debug!(path = %path.display(), error = %e, "No module inventory available");
				return BTreeMap::new();
			}
		};

		match toml::from_str::<LockFile>(&content) {
			Ok(lock) => {
				// A crate locked at several versions keeps its first entry.
				let mut modules = BTreeMap::new();
				for package in lock.package {
					if modules.len() == MAX_MODULES {
						break;
					}
					modules.entry(package.name).or_insert(package.version);
				}
				modules
			}
			Err(e) => {
				debug!(path = %path.display(), error = %e, "Failed to parse module inventory");
				BTreeMap::new()
			}
		}
	}
}

/// An inventory that never reports anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModules;

impl ModuleSource for NoModules {
	fn modules(&self, _root: &Path) -> BTreeMap<String, String> {
		BTreeMap::new()
	}
}
