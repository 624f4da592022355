// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-level hooks for panics and failed background tasks.
//!
//! Panics are caught with a chained `std::panic` hook: the tracker's handler
//! runs first, then whichever hook was installed before it. Rust has no
//! process-wide notion of an unhandled rejection, so failed background tasks
//! are routed through [`report_unhandled_rejection`] or spawned with
//! [`spawn_monitored`].

use std::cell::Cell;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::captured::CapturedError;

/// Receives panics.
pub type UncaughtHandler = Box<dyn Fn(CapturedError) + Send + Sync>;

/// Receives failed background tasks.
pub type RejectionHandler = Arc<dyn Fn(CapturedError) + Send + Sync>;

/// Where the client registers its process-level handlers.
pub trait HookRegistry: Send + Sync {
	fn register_uncaught(&self, handler: UncaughtHandler);
	fn register_rejection(&self, handler: RejectionHandler);
}

/// Registers handlers with the real process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessHooks;

impl HookRegistry for ProcessHooks {
	fn register_uncaught(&self, handler: UncaughtHandler) {
		let previous = panic::take_hook();
		panic::set_hook(Box::new(move |info| {
			if !in_user_callback() {
				handler(CapturedError::from_panic(info));
			}
			previous(info);
		}));
		debug!("Panic hook registered");
	}

	fn register_rejection(&self, handler: RejectionHandler) {
		rejection_handlers()
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.push(handler);
		debug!("Rejection handler registered");
	}
}

fn rejection_handlers() -> &'static RwLock<Vec<RejectionHandler>> {
	static HANDLERS: OnceLock<RwLock<Vec<RejectionHandler>>> = OnceLock::new();
	HANDLERS.get_or_init(|| RwLock::new(Vec::new()))
}

/// Report a background failure nobody handled.
///
/// Returns `false` when no rejection handler is registered in this process.
pub fn report_unhandled_rejection(reason: CapturedError) -> bool {
	let handlers: Vec<RejectionHandler> = rejection_handlers()
		.read()
		.unwrap_or_else(PoisonError::into_inner)
		.clone();

	for handler in &handlers {
		handler(reason.clone());
	}
	!handlers.is_empty()
}

/// Spawn a task whose error, if any, is reported as an unhandled rejection.
///
/// The task's result is still returned through the join handle. Panics are
/// left to the panic hook. Must be called from within a Tokio runtime.
pub fn spawn_monitored<F, T, E>(future: F) -> tokio::task::JoinHandle<Result<T, E>>
where
	F: Future<Output = Result<T, E>> + Send + 'static,
	T: Send + 'static,
	E: std::error::Error + Send + 'static,
{
	tokio::spawn(async move {
		let result = future.await;
		if let Err(e) = &result {
			report_unhandled_rejection(CapturedError::from_error(e));
		}
		result
	})
}

thread_local! {
	static IN_USER_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

fn in_user_callback() -> bool {
	IN_USER_CALLBACK.with(Cell::get)
}

/// Run user code, catching its panics.
///
/// Panics raised here are not captured as crashes, so a misbehaving
/// callback cannot feed events back into the pipeline.
pub(crate) fn call_user<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
	let was_inside = IN_USER_CALLBACK.with(|flag| flag.replace(true));
	let result = panic::catch_unwind(AssertUnwindSafe(f));
	IN_USER_CALLBACK.with(|flag| flag.set(was_inside));
	result
}

#[cfg(test)]
pub(crate) mod testing {
	use super::*;
	use std::sync::Mutex;

	/// Keeps registered handlers so tests can fire them directly.
	#[derive(Default)]
	pub struct RecordingHooks {
		pub uncaught: Mutex<Vec<UncaughtHandler>>,
		pub rejection: Mutex<Vec<RejectionHandler>>,
	}

	impl RecordingHooks {
		pub fn uncaught_count(&self) -> usize {
			self.uncaught.lock().unwrap().len()
		}

		pub fn rejection_count(&self) -> usize {
			self.rejection.lock().unwrap().len()
		}

		pub fn fire_uncaught(&self, error: CapturedError) {
			for handler in self.uncaught.lock().unwrap().iter() {
				handler(error.clone());
			}
		}

		pub fn fire_rejection(&self, error: CapturedError) {
			for handler in self.rejection.lock().unwrap().iter() {
				handler(error.clone());
			}
		}
	}

	impl HookRegistry for RecordingHooks {
		fn register_uncaught(&self, handler: UncaughtHandler) {
			self.uncaught.lock().unwrap().push(handler);
		}

		fn register_rejection(&self, handler: RejectionHandler) {
			self.rejection.lock().unwrap().push(handler);
		}
	}
}
