// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error-reporting client for Rust applications.
//!
//! Captures errors, panics, failed background tasks and plain messages,
//! enriches them with source context and process details, and delivers them
//! to a collection endpoint without blocking the caller.
//!
//! # Features
//!
//! - **Panic capture**: a chained panic hook reports panics before the
//!   previous hook runs
//! - **Source context**: frames carry surrounding source lines and module
//!   names derived from their paths
//! - **Filtering**: data and should-send callbacks plus sampling
//! - **Outcomes**: every capture returns a [`CaptureHandle`]; client-wide
//!   outcomes are broadcast as [`TrackerSignal`]s
//!
//! # Example
//!
//! ```ignore
//! use tracker::{CaptureOverrides, CapturedError, Tracker, TrackerOptions};
//!
//! let tracker = Tracker::new()?;
//! tracker
//!     .configure(
//!         Some("https://collector.example.com/hook/capture-errors/abc123"),
//!         TrackerOptions::new()
//!             .release(env!("CARGO_PKG_VERSION"))
//!             .capture_unhandled_rejections(true),
//!     )?
//!     .install(None);
//!
//! let handle = tracker.capture_exception(
//!     CapturedError::new("PaymentError", "card declined").with_property("order", 1234),
//!     CaptureOverrides::new().with_tag("checkout", "v2"),
//! );
//! handle.outcome().await?;
//! ```

pub mod builder;
pub mod captured;
pub mod client;
pub mod config;
pub mod error;
pub mod frames;
pub mod hooks;
pub mod modules;
pub mod options;
pub mod outcome;
pub mod stack;
pub mod transport;

pub use builder::{CaptureOverrides, SDK_NAME, SDK_VERSION};
pub use captured::CapturedError;
pub use client::{ClientConfig, CrashCallback, Tracker, TrackerBuilder, TrackerState};
pub use config::{init_from_config, TrackerConfig};
pub use error::{Result, TrackerError};
pub use frames::{extract_frames, FsSourceReader, SourceReader};
pub use hooks::{report_unhandled_rejection, spawn_monitored, HookRegistry, ProcessHooks};
pub use modules::{CargoLockSource, ModuleSource, NoModules};
pub use options::{ClientContext, DataCallback, ShouldSendCallback, TrackerOptions};
pub use outcome::{CaptureHandle, TrackerSignal};
pub use stack::RawFrame;
pub use transport::{HttpTransport, Transport, TransportRequest};

pub use tracker_core::{Breadcrumb, BreadcrumbLevel, Dsn, Event, EventId, Exception, Frame, Protocol, Stacktrace};
