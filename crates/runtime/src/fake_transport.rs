//! In-memory transport for exercising the connection without a browser.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let connection = Arc::new(CdpConnection::new(parts, Duration::from_secs(5)));
//! tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.run().await }
//! });
//!
//! let fut = connection.send("Browser.getVersion", json!({}), None);
//! controller.inject_response(0, json!({"product": "Chrome/126"}));
//! let result = fut.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// Builder for creating fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Builds the transport parts and a controller for injecting traffic.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let sent_messages = Arc::new(Mutex::new(Vec::new()));

		let sender = FakeTransportSender {
			sent: Arc::clone(&sent_messages),
			closed: false,
		};
		let receiver = FakeTransportReceiver { inbound_rx, message_tx };
		let controller = FakeTransportController {
			inbound_tx: Some(inbound_tx),
			sent: sent_messages,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};

		(parts, controller)
	}
}

/// Injects inbound messages and inspects outbound ones.
pub struct FakeTransportController {
	inbound_tx: Option<mpsc::UnboundedSender<JsonValue>>,
	sent: Arc<Mutex<Vec<JsonValue>>>,
}

impl FakeTransportController {
	/// Injects a raw JSON message as if the browser sent it.
	pub fn inject(&self, message: JsonValue) {
		if let Some(tx) = &self.inbound_tx {
			let _ = tx.send(message);
		}
	}

	pub fn inject_response(&self, id: u32, result: JsonValue) {
		self.inject(serde_json::json!({ "id": id, "result": result }));
	}

	pub fn inject_error(&self, id: u32, code: i64, message: &str) {
		self.inject(serde_json::json!({
			"id": id,
			"error": { "code": code, "message": message }
		}));
	}

	pub fn inject_event(&self, method: &str, params: JsonValue, session_id: Option<&str>) {
		let mut event = serde_json::json!({ "method": method, "params": params });
		if let Some(session_id) = session_id {
			event["sessionId"] = JsonValue::String(session_id.to_string());
		}
		self.inject(event);
	}

	/// Simulates the browser going away: the receive loop ends.
	pub fn disconnect(&mut self) {
		self.inbound_tx = None;
	}

	/// Takes all sent messages, clearing the buffer.
	pub async fn take_sent(&self) -> Vec<JsonValue> {
		std::mem::take(&mut *self.sent.lock().await)
	}
}

struct FakeTransportSender {
	sent: Arc<Mutex<Vec<JsonValue>>>,
	closed: bool,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		let sent = Arc::clone(&self.sent);
		let closed = self.closed;
		Box::pin(async move {
			if closed {
				return Err(Error::ChannelClosed);
			}
			sent.lock().await.push(message);
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		self.closed = true;
		Box::pin(async { Ok(()) })
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<JsonValue>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(message) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
