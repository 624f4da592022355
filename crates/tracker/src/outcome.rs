// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery outcomes: per-capture handles and client-wide signals.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::error;
use tracker_core::EventId;

use crate::error::{Result, TrackerError};
use crate::hooks::call_user;

/// Broadcast to subscribers when a delivery attempt finishes.
#[derive(Debug, Clone)]
pub enum TrackerSignal {
	/// The endpoint accepted the event.
	Logged(EventId),
	/// Delivery failed, or the endpoint rejected the event.
	Error(Arc<TrackerError>),
}

impl TrackerSignal {
	pub fn event_id(&self) -> Option<EventId> {
		match self {
			Self::Logged(id) => Some(*id),
			Self::Error(err) => err.event_id(),
		}
	}
}

/// How a capture ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
	/// Sent and accepted by the endpoint.
	Sent,
	/// Not sent: disabled, filtered, or sampled out.
	Skipped,
}

/// Returned by every capture call.
///
/// The event id is known immediately; the outcome resolves once, after the
/// delivery attempt finishes. Dropping the handle does not cancel delivery.
#[derive(Debug)]
pub struct CaptureHandle {
	event_id: EventId,
	receiver: oneshot::Receiver<Result<Delivery>>,
	runtime: Option<Handle>,
}

impl CaptureHandle {
	pub(crate) fn new(
		event_id: EventId,
		receiver: oneshot::Receiver<Result<Delivery>>,
		runtime: Option<Handle>,
	) -> Self {
		Self {
			event_id,
			receiver,
			runtime,
		}
	}

	pub fn event_id(&self) -> EventId {
		self.event_id
	}

	/// Wait for the delivery attempt.
	///
	/// `Ok` means the event was accepted or deliberately not sent; the two
	/// cases are not distinguished.
	pub async fn outcome(self) -> Result<EventId> {
		let event_id = self.event_id;
		self.delivery().await.map(|_| event_id)
	}

	/// Call `f` with the outcome once it is known, without waiting for it.
	///
	/// A panic inside `f` is logged and otherwise ignored.
	pub fn on_outcome<F>(self, f: F)
	where
		F: FnOnce(Result<EventId>) + Send + 'static,
	{
		let event_id = self.event_id;
		self.on_delivery(move |result| {
			if call_user(|| f(result.map(|_| event_id))).is_err() {
				error!(event_id = %event_id, "Outcome callback panicked");
			}
		});
	}

	pub(crate) async fn delivery(self) -> Result<Delivery> {
		let event_id = self.event_id;
		self.receiver
			.await
			.unwrap_or(Err(TrackerError::Abandoned { event_id }))
	}

	pub(crate) fn on_delivery<F>(self, f: F)
	where
		F: FnOnce(Result<Delivery>) + Send + 'static,
	{
		let runtime = self.runtime.clone();
		spawn_detached(runtime.as_ref(), async move {
			f(self.delivery().await);
		});
	}
}

/// Spawn a task on the current runtime, else on the configured one, else on
/// a dedicated thread with its own runtime.
pub(crate) fn spawn_detached<F>(configured: Option<&Handle>, future: F)
where
	F: Future<Output = ()> + Send + 'static,
{
	if let Ok(handle) = Handle::try_current() {
		handle.spawn(future);
		return;
	}
	if let Some(handle) = configured {
		handle.spawn(future);
		return;
	}

	spawn_dedicated(future);
}

/// Run a task on a new "tracker-delivery" thread with its own runtime.
///
/// The task keeps running when every other runtime in the process is
/// blocked or shutting down.
pub(crate) fn spawn_dedicated<F>(future: F)
where
	F: Future<Output = ()> + Send + 'static,
{
	let spawned = std::thread::Builder::new()
		.name("tracker-delivery".to_string())
		.spawn(move || {
			match tokio::runtime::Builder::new_current_thread().enable_all().build() {
				Ok(runtime) => runtime.block_on(future),
				Err(e) => error!(error = %e, "Failed to start delivery runtime"),
			}
		});
	if let Err(e) = spawned {
		error!(error = %e, "Failed to spawn delivery thread");
	}
}
