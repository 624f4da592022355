// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A panic on the thread driving a runtime, which shuts down while unwinding.
//!
//! Kept in its own test binary because it installs a process-wide panic hook.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tracker::{CrashCallback, NoModules, Tracker, TrackerOptions};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[test]
fn panic_inside_block_on_is_reported_before_the_runtime_drops() {
	let server_runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(1)
		.enable_all()
		.build()
		.unwrap();
	let server = server_runtime.block_on(async {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({"success": true}))
					.set_delay(Duration::from_millis(200)),
			)
			.mount(&server)
			.await;
		server
	});
	let dsn = format!("{}/hook/capture-errors/key", server.uri());

	let (tx, rx) = std::sync::mpsc::channel();
	let tx = Mutex::new(tx);
	let callback: CrashCallback = Arc::new(move |delivered, error| {
		let _ = tx.lock().unwrap().send((delivered, error.message().to_string()));
	});

	let tracker = Tracker::builder()
		.module_source(Arc::new(NoModules))
		.crash_flush_timeout(Duration::from_secs(5))
		.build()
		.unwrap();

	let app_runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.unwrap();
	let crashed = std::panic::catch_unwind(AssertUnwindSafe(|| {
		app_runtime.block_on(async {
			tracker.configure(Some(&dsn), TrackerOptions::new()).unwrap().install(Some(callback));
			panic!("main crashed");
		})
	}));
	assert!(crashed.is_err());
	drop(app_runtime);

	// The hook waited for the report, so the outcome is already known.
	assert_eq!(rx.try_recv().unwrap(), (true, "main crashed".to_string()));

	let requests = server_runtime.block_on(server.received_requests()).unwrap();
	assert_eq!(requests.len(), 1);
}
