// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the tracker error-reporting client.
//!
//! This crate holds the types shared by the client SDK (`tracker`) and by
//! anything that needs to read or produce the wire format:
//! - [`Dsn`]: the parsed collection endpoint
//! - [`Event`], [`Exception`], [`Stacktrace`], [`Frame`]: the delivered payload
//! - [`Breadcrumb`]: markers of prior application activity
//! - [`find_culprit`]: the short fault locator derived from frames

pub mod breadcrumb;
pub mod culprit;
pub mod dsn;
pub mod error;
pub mod event;

pub use breadcrumb::{Breadcrumb, BreadcrumbLevel};
pub use culprit::{describe_frame, find_culprit, truncate};
pub use dsn::{Dsn, Protocol, CAPTURE_ROUTE};
pub use error::{CoreError, Result};
pub use event::{Event, EventId, Exception, Frame, Stacktrace, DEFAULT_PLATFORM};
