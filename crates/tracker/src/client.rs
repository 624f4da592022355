// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tracker client: configuration, capture pipeline and process hooks.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};
use tracker_core::{truncate, Breadcrumb, Dsn, Event, EventId};

use crate::builder::{build_event, Ambient, Capture, CaptureOverrides};
use crate::captured::CapturedError;
use crate::error::{Result, TrackerError};
use crate::frames::{extract_frames, FsSourceReader, SourceReader};
use crate::hooks::{call_user, HookRegistry, ProcessHooks, RejectionHandler};
use crate::modules::{CargoLockSource, ModuleSource};
use crate::options::{ClientContext, DataCallback, ShouldSendCallback, TrackerOptions};
use crate::outcome::{spawn_dedicated, spawn_detached, CaptureHandle, Delivery, TrackerSignal};
use crate::transport::{HttpTransport, Transport, TransportRequest};

/// Maximum number of breadcrumbs to keep.
const MAX_BREADCRUMBS: usize = 100;

/// Signals buffered per subscriber before the oldest are dropped.
const SIGNAL_CAPACITY: usize = 64;

/// Longest payload preview written to the debug log.
const DEBUG_PAYLOAD_PREVIEW: usize = 2048;

/// Called once a crash report's outcome is known: `true` when the event was
/// sent and accepted.
pub type CrashCallback = Arc<dyn Fn(bool, &CapturedError) + Send + Sync>;

/// Configuration for the client itself, independent of the DSN.
#[derive(Debug, Clone)]
pub struct ClientConfig {
	/// Timeout for HTTP requests.
	pub request_timeout: Duration,
	/// Maximum breadcrumbs to keep.
	pub max_breadcrumbs: usize,
	/// How long a panicking thread waits for its crash report before the
	/// previous panic hook runs.
	pub crash_flush_timeout: Duration,
}

impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			max_breadcrumbs: MAX_BREADCRUMBS,
			crash_flush_timeout: Duration::from_secs(2),
		}
	}
}

/// Lifecycle state of a client. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
	Unconfigured,
	Configured,
	Installed,
}

/// Builder for constructing a [`Tracker`].
pub struct TrackerBuilder {
	transport: Option<Arc<dyn Transport>>,
	hooks: Option<Arc<dyn HookRegistry>>,
	source_reader: Option<Arc<dyn SourceReader>>,
	module_source: Option<Arc<dyn ModuleSource>>,
	config: ClientConfig,
}

impl TrackerBuilder {
	pub fn new() -> Self {
		Self {
			transport: None,
			hooks: None,
			source_reader: None,
			module_source: None,
			config: ClientConfig::default(),
		}
	}

	/// Replaces the HTTP transport.
	pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
		self.transport = Some(transport);
		self
	}

	/// Replaces the process hook registry.
	pub fn hooks(mut self, hooks: Arc<dyn HookRegistry>) -> Self {
		self.hooks = Some(hooks);
		self
	}

	/// Replaces the filesystem reader used for source context.
	pub fn source_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
		self.source_reader = Some(reader);
		self
	}

	/// Replaces the `Cargo.lock` module inventory.
	pub fn module_source(mut self, source: Arc<dyn ModuleSource>) -> Self {
		self.module_source = Some(source);
		self
	}

	/// Sets the HTTP request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout = timeout;
		self
	}

	/// Sets the maximum number of breadcrumbs to keep.
	pub fn max_breadcrumbs(mut self, max: usize) -> Self {
		self.config.max_breadcrumbs = max;
		self
	}

	pub fn crash_flush_timeout(mut self, timeout: Duration) -> Self {
		self.config.crash_flush_timeout = timeout;
		self
	}

	/// Builds an unconfigured client.
	pub fn build(self) -> Result<Tracker> {
		let transport: Arc<dyn Transport> = match self.transport {
			Some(transport) => transport,
			None => Arc::new(HttpTransport::new(self.config.request_timeout)?),
		};
		let (signals, _) = broadcast::channel(SIGNAL_CAPACITY);

		let inner = Arc::new(TrackerInner {
			settings: RwLock::new(Arc::new(Settings::default())),
			transport,
			hooks: self.hooks.unwrap_or_else(|| Arc::new(ProcessHooks)),
			reader: self.source_reader.unwrap_or_else(|| Arc::new(FsSourceReader)),
			module_source: self.module_source.unwrap_or_else(|| Arc::new(CargoLockSource::new())),
			config: self.config,
			configured: AtomicBool::new(false),
			installed: AtomicBool::new(false),
			crash_in_flight: AtomicBool::new(false),
			tags: RwLock::new(BTreeMap::new()),
			extra: RwLock::new(serde_json::Map::new()),
			breadcrumbs: RwLock::new(VecDeque::new()),
			modules: OnceLock::new(),
			rejection_handler: OnceLock::new(),
			runtime: RwLock::new(None),
			signals,
		});

		Ok(Tracker { inner })
	}
}

impl Default for TrackerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Configuration in effect, swapped as a whole by `configure`.
#[derive(Default)]
struct Settings {
	/// `None` means the client is disabled.
	dsn: Option<Dsn>,
	context: ClientContext,
}

/// Internal client state.
struct TrackerInner {
	settings: RwLock<Arc<Settings>>,
	transport: Arc<dyn Transport>,
	hooks: Arc<dyn HookRegistry>,
	reader: Arc<dyn SourceReader>,
	module_source: Arc<dyn ModuleSource>,
	config: ClientConfig,
	configured: AtomicBool,
	installed: AtomicBool,
	crash_in_flight: AtomicBool,
	tags: RwLock<BTreeMap<String, String>>,
	extra: RwLock<serde_json::Map<String, serde_json::Value>>,
	breadcrumbs: RwLock<VecDeque<Breadcrumb>>,
	modules: OnceLock<BTreeMap<String, String>>,
	rejection_handler: OnceLock<RejectionHandler>,
	runtime: RwLock<Option<Handle>>,
	signals: broadcast::Sender<TrackerSignal>,
}

/// What a capture carries into the pipeline.
enum Payload {
	Message(String),
	Exception(CapturedError),
}

/// How an event reaches the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
	Regular,
	Crash,
}

impl TrackerInner {
	fn settings(&self) -> Arc<Settings> {
		match self.settings.read() {
			Ok(settings) => Arc::clone(&settings),
			Err(_) => {
				error!("Settings lock poisoned, capturing with defaults");
				Arc::new(Settings::default())
			}
		}
	}

	fn runtime(&self) -> Option<Handle> {
		self.runtime.read().ok().and_then(|r| r.clone())
	}

	/// Client-wide mutable state at capture time. Module inventory is
	/// filled in later, off the caller's thread.
	fn ambient(&self) -> Ambient {
		Ambient {
			tags: self.tags.read().map(|t| t.clone()).unwrap_or_default(),
			extra: self.extra.read().map(|e| e.clone()).unwrap_or_default(),
			breadcrumbs: self
				.breadcrumbs
				.read()
				.map(|b| b.iter().cloned().collect())
				.unwrap_or_default(),
			modules: BTreeMap::new(),
		}
	}

	fn capture(self: &Arc<Self>, payload: Payload, overrides: CaptureOverrides) -> CaptureHandle {
		let event_id = EventId::new();
		let settings = self.settings();
		let ambient = self.ambient();
		let runtime = self.runtime();
		let (tx, rx) = oneshot::channel();

		let inner = Arc::clone(self);
		spawn_detached(runtime.as_ref(), async move {
			let result = inner
				.process(event_id, payload, overrides, &settings, ambient, Route::Regular)
				.await;
			inner.announce(event_id, &result);
			let _ = tx.send(result);
		});

		CaptureHandle::new(event_id, rx, runtime)
	}

	async fn process(
		&self,
		event_id: EventId,
		payload: Payload,
		overrides: CaptureOverrides,
		settings: &Settings,
		mut ambient: Ambient,
		route: Route,
	) -> Result<Delivery> {
		let context = &settings.context;

		let frames = match &payload {
			Payload::Exception(error) => {
				extract_frames(error.stack(), &context.root, self.reader.as_ref()).await
			}
			Payload::Message(_) => Vec::new(),
		};
		let capture = match &payload {
			Payload::Message(text) => Capture::Message(text),
			Payload::Exception(error) => Capture::Exception(error, &frames),
		};

		ambient.modules = self.modules(&context.root).await;

		let mut event = build_event(event_id, capture, context, &overrides, ambient);
		if let Some(callback) = &context.data_callback {
			event = apply_data_callback(callback, event);
		}

		let Some(dsn) = &settings.dsn else {
			debug!(event_id = %event_id, "Client disabled, event not sent");
			return Ok(Delivery::Skipped);
		};
		if let Some(callback) = &context.should_send_callback {
			if !should_send(callback, &event) {
				debug!(event_id = %event_id, "Event filtered by should-send callback");
				return Ok(Delivery::Skipped);
			}
		}
		if fastrand::f64() >= context.sample_rate {
			debug!(event_id = %event_id, sample_rate = context.sample_rate, "Event sampled out");
			return Ok(Delivery::Skipped);
		}

		let serialized = serde_json::to_vec(&event)?;
		if context.debug {
			info!(
				event_id = %event_id,
				payload = %truncate(&String::from_utf8_lossy(&serialized), DEBUG_PAYLOAD_PREVIEW),
				"Sending event"
			);
		}

		let mut headers = context.headers.clone();
		headers.extend(overrides.headers);

		let request = TransportRequest {
			dsn: dsn.clone(),
			event_id,
			headers,
			payload: serialized,
		};
		match route {
			Route::Regular => self.transport.send(request).await?,
			Route::Crash => self.transport.send_crash(request).await?,
		};
		Ok(Delivery::Sent)
	}

	/// The module inventory, read once on the blocking pool.
	async fn modules(&self, root: &Path) -> BTreeMap<String, String> {
		if let Some(modules) = self.modules.get() {
			return modules.clone();
		}

		let source = Arc::clone(&self.module_source);
		let root = root.to_path_buf();
		match tokio::task::spawn_blocking(move || source.modules(&root)).await {
			Ok(modules) => self.modules.get_or_init(|| modules).clone(),
			Err(e) => {
				warn!(error = %e, "Module inventory failed");
				BTreeMap::new()
			}
		}
	}

	/// Broadcast the outcome. Responses without a verdict stay quiet.
	fn announce(&self, event_id: EventId, result: &Result<Delivery>) {
		match result {
			Ok(Delivery::Sent) => {
				debug!(event_id = %event_id, "Event delivered");
				let _ = self.signals.send(TrackerSignal::Logged(event_id));
			}
			Ok(Delivery::Skipped) => {}
			Err(e) if e.is_signalled() => {
				warn!(
					event_id = %event_id,
					error = %e,
					response = ?e.response(),
					"Failed to deliver event"
				);
				let _ = self.signals.send(TrackerSignal::Error(Arc::new(e.clone())));
			}
			Err(e) => debug!(event_id = %event_id, error = %e, "Delivery finished without a verdict"),
		}
	}

	/// Report a panic, telling `callback` how it went.
	///
	/// Only one crash report is tracked at a time: a panic arriving while
	/// another is in flight is reported as failed immediately and not
	/// captured.
	fn handle_crash(self: &Arc<Self>, callback: Option<&CrashCallback>, error: CapturedError) {
		let Some(callback) = callback else {
			self.report_crash(error, |_| {});
			return;
		};

		if self.crash_in_flight.swap(true, Ordering::SeqCst) {
			notify_crash(callback, false, &error);
			return;
		}

		let inner = Arc::clone(self);
		let callback = Arc::clone(callback);
		let reported = error.clone();
		self.report_crash(error, move |result| {
			inner.crash_in_flight.store(false, Ordering::SeqCst);
			notify_crash(&callback, matches!(result, Ok(Delivery::Sent)), &reported);
		});
	}

	/// Deliver a crash report on its own thread and runtime, blocking the
	/// panicking thread until it finishes or `crash_flush_timeout` passes.
	///
	/// The panicking thread may be the one driving a runtime that unwinds
	/// and shuts down right after the hook returns.
	fn report_crash<F>(self: &Arc<Self>, error: CapturedError, then: F)
	where
		F: FnOnce(Result<Delivery>) + Send + 'static,
	{
		let event_id = EventId::new();
		let settings = self.settings();
		let ambient = self.ambient();
		error!(event_id = %event_id, message = %error.message(), "Panic captured");

		let (done_tx, done_rx) = std::sync::mpsc::channel();
		let inner = Arc::clone(self);
		spawn_dedicated(async move {
			let result = inner
				.process(
					event_id,
					Payload::Exception(error),
					CaptureOverrides::default(),
					&settings,
					ambient,
					Route::Crash,
				)
				.await;
			inner.announce(event_id, &result);
			then(result);
			let _ = done_tx.send(());
		});

		if done_rx.recv_timeout(self.config.crash_flush_timeout).is_err() {
			warn!(event_id = %event_id, "Crash report still in flight, continuing");
		}
	}

	fn handle_rejection(self: &Arc<Self>, callback: Option<&CrashCallback>, reason: CapturedError) {
		let handle = self.capture(Payload::Exception(reason.clone()), CaptureOverrides::default());
		error!(event_id = %handle.event_id(), "Unhandled rejection captured");

		if let Some(callback) = callback {
			let callback = Arc::clone(callback);
			handle.on_delivery(move |result| notify_crash(&callback, result.is_ok(), &reason));
		}
	}
}

fn notify_crash(callback: &CrashCallback, delivered: bool, error: &CapturedError) {
	if call_user(|| callback(delivered, error)).is_err() {
		error!("Crash callback panicked");
	}
}

/// A panicking callback leaves the event unmodified.
fn apply_data_callback(callback: &DataCallback, event: Event) -> Event {
	let original = event.clone();
	match call_user(|| callback(event)) {
		Ok(event) => event,
		Err(_) => {
			error!(event_id = %original.event_id, "Data callback panicked, sending event unmodified");
			original
		}
	}
}

/// A panicking callback suppresses the event.
fn should_send(callback: &ShouldSendCallback, event: &Event) -> bool {
	call_user(|| callback(event)).unwrap_or_else(|_| {
		error!(event_id = %event.event_id, "Should-send callback panicked, suppressing event");
		false
	})
}

/// Client for capturing errors and reporting them to a collection endpoint.
///
/// # Example
///
/// ```ignore
/// use tracker::{CaptureOverrides, Tracker, TrackerOptions};
///
/// let tracker = Tracker::new()?;
/// tracker
///     .configure(
///         Some("https://collector.example.com/hook/capture-errors/abc123"),
///         TrackerOptions::new().release(env!("CARGO_PKG_VERSION")).environment("production"),
///     )?
///     .install(None);
///
/// let handle = tracker.capture_message("cache warmed", CaptureOverrides::default());
/// println!("captured {}", handle.event_id());
///
/// if let Err(e) = do_something() {
///     tracker.capture_error(&e).outcome().await?;
/// }
/// ```
#[derive(Clone)]
pub struct Tracker {
	inner: Arc<TrackerInner>,
}

impl Tracker {
	/// Creates a new builder for constructing a Tracker.
	pub fn builder() -> TrackerBuilder {
		TrackerBuilder::new()
	}

	/// Creates an unconfigured client with the default transport and hooks.
	pub fn new() -> Result<Self> {
		TrackerBuilder::new().build()
	}

	/// Validates the DSN and replaces the client context.
	///
	/// Without a DSN the client runs disabled: captures still produce ids
	/// and outcomes, but nothing is sent. Initial breadcrumbs replace the
	/// current trail.
	pub fn configure(&self, dsn: Option<&str>, mut options: TrackerOptions) -> Result<&Self> {
		let dsn = match dsn.filter(|d| !d.trim().is_empty()) {
			Some(dsn) => Some(Dsn::parse(dsn)?),
			None => {
				warn!("No DSN provided, error reporting disabled");
				None
			}
		};

		let initial_breadcrumbs = std::mem::take(&mut options.breadcrumbs);
		let context = ClientContext::from_options(options);

		{
			let mut breadcrumbs = self.inner.breadcrumbs.write().map_err(|_| TrackerError::LockError)?;
			breadcrumbs.clear();
			breadcrumbs.extend(initial_breadcrumbs);
			trim_breadcrumbs(&mut breadcrumbs, self.inner.config.max_breadcrumbs);
		}

		if let Ok(handle) = Handle::try_current() {
			*self.inner.runtime.write().map_err(|_| TrackerError::LockError)? = Some(handle);
		}

		let enabled = dsn.is_some();
		*self.inner.settings.write().map_err(|_| TrackerError::LockError)? = Arc::new(Settings { dsn, context });
		self.inner.configured.store(true, Ordering::SeqCst);

		debug!(enabled, "Tracker configured");
		Ok(self)
	}

	/// Registers the panic hook and, when enabled in the options, the
	/// unhandled-rejection handler.
	///
	/// Calling it again is a no-op.
	pub fn install(&self, callback: Option<CrashCallback>) -> &Self {
		if self.inner.installed.swap(true, Ordering::SeqCst) {
			return self;
		}

		let weak = Arc::downgrade(&self.inner);
		let crash_callback = callback.clone();
		self.inner.hooks.register_uncaught(Box::new(move |error| {
			if let Some(inner) = Weak::upgrade(&weak) {
				inner.handle_crash(crash_callback.as_ref(), error);
			}
		}));

		let settings = self.inner.settings();
		if settings.context.capture_unhandled_rejections {
			let weak = Arc::downgrade(&self.inner);
			let handler: RejectionHandler = Arc::new(move |reason| {
				if let Some(inner) = Weak::upgrade(&weak) {
					inner.handle_rejection(callback.as_ref(), reason);
				}
			});
			let _ = self.inner.rejection_handler.set(Arc::clone(&handler));
			self.inner.hooks.register_rejection(handler);
		}

		if settings.context.debug {
			match &settings.dsn {
				Some(dsn) => info!(
					hostname = %dsn.hostname(),
					path = %dsn.path(),
					port = dsn.port(),
					protocol = %dsn.protocol(),
					"Tracker installed"
				),
				None => info!("Tracker installed without a DSN"),
			}
		}

		self
	}

	pub fn state(&self) -> TrackerState {
		if self.inner.installed.load(Ordering::SeqCst) {
			TrackerState::Installed
		} else if self.inner.configured.load(Ordering::SeqCst) {
			TrackerState::Configured
		} else {
			TrackerState::Unconfigured
		}
	}

	/// Whether events are sent at all.
	pub fn is_enabled(&self) -> bool {
		self.inner.settings().dsn.is_some()
	}

	/// Captures a text message.
	pub fn capture_message(&self, message: impl Into<String>, overrides: CaptureOverrides) -> CaptureHandle {
		self.inner.capture(Payload::Message(message.into()), overrides)
	}

	/// Captures a structured error.
	pub fn capture_exception(&self, error: CapturedError, overrides: CaptureOverrides) -> CaptureHandle {
		self.inner.capture(Payload::Exception(error), overrides)
	}

	/// Captures any error with its `source()` chain.
	pub fn capture_error<E>(&self, error: &E) -> CaptureHandle
	where
		E: std::error::Error + ?Sized,
	{
		self.capture_exception(CapturedError::from_error(error), CaptureOverrides::default())
	}

	/// Reports a failed background task through this client's rejection
	/// handler.
	///
	/// Returns `false` when rejection capture was not enabled at install.
	pub fn report_rejection(&self, reason: CapturedError) -> bool {
		match self.inner.rejection_handler.get() {
			Some(handler) => {
				handler(reason);
				true
			}
			None => false,
		}
	}

	/// Receives a signal for every finished delivery attempt.
	pub fn subscribe(&self) -> broadcast::Receiver<TrackerSignal> {
		self.inner.signals.subscribe()
	}

	/// Sets a tag attached to all later events.
	pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
		self.inner
			.tags
			.write()
			.map_err(|_| TrackerError::LockError)?
			.insert(key.into(), value.into());
		Ok(())
	}

	pub fn remove_tag(&self, key: &str) -> Result<()> {
		self.inner.tags.write().map_err(|_| TrackerError::LockError)?.remove(key);
		Ok(())
	}

	/// Sets extra data attached to all later events.
	pub fn set_extra(&self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
		self.inner
			.extra
			.write()
			.map_err(|_| TrackerError::LockError)?
			.insert(key.into(), value);
		Ok(())
	}

	/// Adds a breadcrumb to the trail, dropping the oldest past the limit.
	pub fn add_breadcrumb(&self, breadcrumb: Breadcrumb) -> Result<()> {
		let mut breadcrumbs = self.inner.breadcrumbs.write().map_err(|_| TrackerError::LockError)?;
		breadcrumbs.push_back(breadcrumb);
		trim_breadcrumbs(&mut breadcrumbs, self.inner.config.max_breadcrumbs);
		Ok(())
	}

	pub fn clear_breadcrumbs(&self) -> Result<()> {
		self.inner.breadcrumbs.write().map_err(|_| TrackerError::LockError)?.clear();
		Ok(())
	}
}

impl fmt::Debug for Tracker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Tracker")
			.field("state", &self.state())
			.field("enabled", &self.is_enabled())
			.finish_non_exhaustive()
	}
}

fn trim_breadcrumbs(breadcrumbs: &mut VecDeque<Breadcrumb>, max: usize) {
	while breadcrumbs.len() > max {
		breadcrumbs.pop_front();
	}
}
