// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of serialized events to the collection endpoint.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};
use tracker_core::{Dsn, EventId};

use crate::builder::{SDK_NAME, SDK_VERSION};
use crate::error::{Result, TrackerError};

/// One delivery attempt.
#[derive(Debug, Clone)]
pub struct TransportRequest {
	pub dsn: Dsn,
	pub event_id: EventId,
	/// Client headers merged with per-call headers.
	pub headers: BTreeMap<String, String>,
	/// The serialized event.
	pub payload: Vec<u8>,
}

/// Sends events. Each call resolves exactly once.
///
/// `Ok` carries the event id of an accepted event.
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, request: TransportRequest) -> Result<EventId>;

	/// Send a crash report.
	///
	/// Runs on a short-lived runtime while the crashing thread waits, so it
	/// must not rely on connections driven by any other runtime.
	async fn send_crash(&self, request: TransportRequest) -> Result<EventId> {
		self.send(request).await
	}
}

/// Delivers events over HTTP(S) with reqwest.
///
/// Crash reports use a second client that keeps no idle connections, so a
/// crash on a blocked runtime never waits on a connection that runtime owns.
#[derive(Debug, Clone)]
pub struct HttpTransport {
	client: Client,
	crash_client: Client,
}

impl HttpTransport {
	pub fn new(request_timeout: Duration) -> Result<Self> {
		Ok(Self {
			client: build_client(request_timeout, None)?,
			crash_client: build_client(request_timeout, Some(0))?,
		})
	}

	/// Uses an existing reqwest client for all deliveries, crash reports
	/// included.
	pub fn with_client(client: Client) -> Self {
		Self {
			crash_client: client.clone(),
			client,
		}
	}

	async fn deliver(&self, client: &Client, request: TransportRequest) -> Result<EventId> {
		let event_id = request.event_id;
		let body = encode_payload(&request.payload)?;
		let url = request.dsn.url();

		debug!(url = %url, event_id = %event_id, bytes = body.len(), "Sending event");

		let response = client
			.post(&url)
			.headers(build_headers(&request.headers))
			.body(body)
			.send()
			.await
			.map_err(|e| TrackerError::Transport {
				event_id,
				source: Arc::new(e),
			})?;

		let status = response.status().as_u16();
		let body = match response.bytes().await {
			Ok(bytes) => Some(bytes),
			Err(e) => {
				debug!(event_id = %event_id, error = %e, "Failed to read response body");
				None
			}
		};

		interpret_response(event_id, status, body.as_deref())
	}
}

fn build_client(request_timeout: Duration, max_idle_per_host: Option<usize>) -> Result<Client> {
	let mut builder = Client::builder()
		.timeout(request_timeout)
		.user_agent(format!("{SDK_NAME}/{SDK_VERSION}"));
	if let Some(max) = max_idle_per_host {
		builder = builder.pool_max_idle_per_host(max);
	}
	builder
		.build()
		.map_err(|e| TrackerError::Config(format!("failed to build HTTP client: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
	async fn send(&self, request: TransportRequest) -> Result<EventId> {
		self.deliver(&self.client, request).await
	}

	async fn send_crash(&self, request: TransportRequest) -> Result<EventId> {
		self.deliver(&self.crash_client, request).await
	}
}

/// Compress and encode a serialized event into the request body
/// `{"data": base64(zlib(payload))}`.
pub fn encode_payload(payload: &[u8]) -> Result<Vec<u8>> {
	let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
	encoder.write_all(payload)?;
	let compressed = encoder.finish()?;

	let body = serde_json::json!({ "data": STANDARD.encode(compressed) });
	Ok(serde_json::to_vec(&body)?)
}

/// The content type always wins over caller-supplied headers.
fn build_headers(headers: &BTreeMap<String, String>) -> HeaderMap {
	let mut map = HeaderMap::new();
	for (name, value) in headers {
		match (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) {
			(Ok(name), Ok(value)) => {
				map.insert(name, value);
			}
			_ => warn!(header = %name, "Skipping invalid request header"),
		}
	}
	map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	map
}

/// Decide the outcome of a delivery from the response.
///
/// A JSON object body that does not carry `success: true` is a rejection,
/// whatever the status. Otherwise a 2xx status accepts the event. Anything
/// else has no verdict.
pub fn interpret_response(event_id: EventId, status: u16, body: Option<&[u8]>) -> Result<EventId> {
	let parsed = body
		.and_then(|b| serde_json::from_slice::<Value>(b).ok())
		.filter(Value::is_object);

	if let Some(response) = parsed {
		if response.get("success") != Some(&Value::Bool(true)) {
			let message = match response.get("message") {
				Some(Value::String(s)) => s.clone(),
				Some(other) => other.to_string(),
				None => "undefined".to_string(),
			};
			return Err(TrackerError::RemoteRejection {
				event_id,
				status,
				message,
				response,
			});
		}
	}

	if (200..300).contains(&status) {
		Ok(event_id)
	} else {
		Err(TrackerError::NoVerdict { event_id, status })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use flate2::read::ZlibDecoder;
	use proptest::prelude::*;
	use std::io::Read;
	use wiremock::matchers::{header, method, path};
	use wiremock::{Mock, MockServer, Request, ResponseTemplate};

	fn decode_body(body: &[u8]) -> Value {
		let envelope: Value = serde_json::from_slice(body).unwrap();
		let compressed = STANDARD.decode(envelope["data"].as_str().unwrap()).unwrap();
		let mut json = String::new();
		ZlibDecoder::new(compressed.as_slice()).read_to_string(&mut json).unwrap();
		serde_json::from_str(&json).unwrap()
	}

	fn body(text: &str) -> Option<&[u8]> {
		Some(text.as_bytes())
	}

	fn request_for(server: &MockServer, payload: Value) -> TransportRequest {
		TransportRequest {
			dsn: Dsn::parse(&format!("{}/hook/capture-errors/abc", server.uri())).unwrap(),
			event_id: EventId::new(),
			headers: BTreeMap::from([("X-Api-Key".to_string(), "k".to_string())]),
			payload: serde_json::to_vec(&payload).unwrap(),
		}
	}

	#[test]
	fn payload_roundtrips_through_envelope() {
		let body = encode_payload(br#"{"title":"hello"}"#).unwrap();
		assert_eq!(decode_body(&body), serde_json::json!({"title": "hello"}));
	}

	#[test]
	fn accepted_responses() {
		let id = EventId::new();
		assert_eq!(interpret_response(id, 200, body(r#"{"success":true}"#)).unwrap(), id);
		assert_eq!(interpret_response(id, 204, None).unwrap(), id);
		assert_eq!(interpret_response(id, 200, body("ok")).unwrap(), id);
	}

	#[test]
	fn rejection_when_success_is_not_true() {
		let id = EventId::new();
		let err = interpret_response(id, 200, body(r#"{"success":false,"message":"bad"}"#)).unwrap_err();
		assert!(matches!(
			err,
			TrackerError::RemoteRejection { status: 200, ref message, event_id, .. }
				if message == "bad" && event_id == id
		));

		let err = interpret_response(id, 500, body(r#"{"error":"boom"}"#)).unwrap_err();
		assert_eq!(err.to_string(), "HTTP Request Error (500): undefined");
	}

	#[test]
	fn no_verdict_for_unparsable_failures() {
		let id = EventId::new();
		let err = interpret_response(id, 502, body("<html>bad gateway</html>")).unwrap_err();
		assert!(matches!(err, TrackerError::NoVerdict { status: 502, .. }));

		let err = interpret_response(id, 500, body(r#"{"success":true}"#)).unwrap_err();
		assert!(matches!(err, TrackerError::NoVerdict { status: 500, .. }));
	}

	#[test]
	fn content_type_wins_over_caller_headers() {
		let headers = BTreeMap::from([
			("content-type".to_string(), "text/plain".to_string()),
			("X-Trace".to_string(), "1".to_string()),
			("bad header".to_string(), "x".to_string()),
		]);
		let map = build_headers(&headers);
		assert_eq!(map[CONTENT_TYPE], "application/json");
		assert_eq!(map.get_all(CONTENT_TYPE).iter().count(), 1);
		assert_eq!(map["x-trace"], "1");
		assert_eq!(map.len(), 2);
	}

	#[tokio::test]
	async fn posts_compressed_event() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/hook/capture-errors/abc"))
			.and(header("content-type", "application/json"))
			.and(header("x-api-key", "k"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
			.expect(1)
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
		let request = request_for(&server, serde_json::json!({"title": "hello"}));
		let id = request.event_id;

		assert_eq!(transport.send(request).await.unwrap(), id);

		let received: Vec<Request> = server.received_requests().await.unwrap();
		assert_eq!(decode_body(&received[0].body), serde_json::json!({"title": "hello"}));
		let agent = received[0].headers.get("user-agent").unwrap().to_str().unwrap();
		assert!(agent.starts_with("tracker-rust/"));
	}

	#[tokio::test]
	async fn crash_send_works_while_the_sending_runtime_is_blocked() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": true})))
			.expect(2)
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
		transport
			.send(request_for(&server, serde_json::json!({"title": "warm"})))
			.await
			.unwrap();

		let crash = request_for(&server, serde_json::json!({"title": "crash"}));
		let id = crash.event_id;
		let (tx, rx) = std::sync::mpsc::channel();
		let crash_transport = transport.clone();
		std::thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
			let _ = tx.send(runtime.block_on(crash_transport.send_crash(crash)));
		});

		// Blocks this runtime the way a panicking thread does.
		let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
		assert_eq!(result.unwrap(), id);
	}

	#[tokio::test]
	async fn remote_rejection_from_server() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(
				ResponseTemplate::new(200).set_body_json(serde_json::json!({"success": false, "message": "bad"})),
			)
			.mount(&server)
			.await;

		let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
		let request = request_for(&server, serde_json::json!({}));
		let id = request.event_id;

		let err = transport.send(request).await.unwrap_err();
		assert_eq!(err.status_code(), Some(200));
		assert_eq!(err.event_id(), Some(id));
		assert_eq!(err.response().unwrap()["message"], "bad");
	}

	#[tokio::test]
	async fn connection_failure_is_a_transport_error() {
		let server = MockServer::start().await;
		let request = request_for(&server, serde_json::json!({}));
		drop(server);

		let transport = HttpTransport::new(Duration::from_secs(2)).unwrap();
		let id = request.event_id;
		let err = transport.send(request).await.unwrap_err();
		assert!(matches!(err, TrackerError::Transport { event_id, .. } if event_id == id));
	}

	proptest! {
		#[test]
		fn json_objects_without_success_are_rejected(status in 100u16..600, message in "[a-z ]{0,20}") {
			let body = serde_json::json!({"success": false, "message": message}).to_string();
			let err = interpret_response(EventId::new(), status, Some(body.as_bytes())).unwrap_err();
			match err {
				TrackerError::RemoteRejection { status: got, message: got_message, .. } => {
					prop_assert_eq!(got, status);
					prop_assert_eq!(got_message, message);
				}
				other => prop_assert!(false, "unexpected error: {other:?}"),
			}
		}

		#[test]
		fn non_json_bodies_follow_status(status in 100u16..600, text in "[a-z<>/ ]{0,20}") {
			let id = EventId::new();
			let result = interpret_response(id, status, Some(text.as_bytes()));
			if (200..300).contains(&status) {
				prop_assert_eq!(result.unwrap(), id);
			} else {
				let is_no_verdict = matches!(result, Err(TrackerError::NoVerdict { .. }));
				prop_assert!(is_no_verdict);
			}
		}
	}
}
