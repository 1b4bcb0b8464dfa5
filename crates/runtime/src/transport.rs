//! Message transports for the DevTools connection.
//!
//! A transport is split in two halves so the send side can be shared behind a
//! lock while the receive side runs in its own task:
//!
//! * [`Transport`] pushes outbound JSON messages.
//! * [`TransportReceiver`] pumps inbound messages into an unbounded channel until
//!   the peer goes away.
//!
//! [`WebSocketTransport`] is the production implementation. Tests use
//! [`FakeTransportBuilder`](crate::fake_transport::FakeTransportBuilder).

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value as JsonValue;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::Result;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the outbound side. Further sends fail.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async { Ok(()) })
	}
}

/// Inbound half of a transport.
pub trait TransportReceiver: Send {
	/// Runs until the peer closes the stream or an I/O error occurs.
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves plus the channel the receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<JsonValue>,
}

/// Websocket transport speaking JSON text frames.
pub struct WebSocketTransport {
	sink: SplitSink<WsStream, Message>,
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl WebSocketTransport {
	/// Opens a websocket to `url` and returns the transport with its inbound channel.
	pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<JsonValue>)> {
		debug!(target = "tabpool.transport", %url, "opening websocket");
		let (ws, _response) = tokio_tungstenite::connect_async(url).await?;
		let (sink, stream) = ws.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		Ok((Self { sink, stream, message_tx }, message_rx))
	}

	/// Splits into [`TransportParts`] for [`CdpConnection::new`](crate::connection::CdpConnection::new).
	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<JsonValue>) -> TransportParts {
		TransportParts {
			sender: Box::new(WebSocketSender { sink: self.sink }),
			receiver: Box::new(WebSocketReceiver {
				stream: self.stream,
				message_tx: self.message_tx,
			}),
			message_rx,
		}
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: JsonValue) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			let text = serde_json::to_string(&message)?;
			trace!(target = "tabpool.transport", bytes = text.len(), "send");
			self.sink.send(Message::Text(text.into())).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			self.sink.close().await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<JsonValue>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let value = match frame? {
					Message::Text(text) => serde_json::from_str::<JsonValue>(&text),
					Message::Binary(bytes) => serde_json::from_slice::<JsonValue>(&bytes),
					Message::Close(frame) => {
						debug!(target = "tabpool.transport", ?frame, "peer closed websocket");
						break;
					}
					_ => continue,
				};

				match value {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(err) => warn!(target = "tabpool.transport", error = %err, "dropping malformed frame"),
				}
			}
			Ok(())
		})
	}
}
