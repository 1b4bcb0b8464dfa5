//! Error types for the DevTools runtime.

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the runtime crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the transport, the connection, or endpoint discovery.
#[derive(Debug, Error)]
pub enum Error {
	/// Websocket I/O failed.
	#[error("transport error: {0}")]
	Transport(String),

	/// The connection went away before a response arrived, or was already closed.
	#[error("connection closed")]
	ChannelClosed,

	/// The browser answered with an error payload.
	#[error("protocol error {code}: {message}")]
	Protocol { code: i64, message: String },

	/// No response within the configured request timeout.
	#[error("{method} timed out after {timeout:?}")]
	Timeout { method: String, timeout: Duration },

	/// Page script threw or navigation reported an error.
	#[error("page error: {0}")]
	Page(String),

	/// The endpoint string is not a usable ws/http URL.
	#[error("invalid endpoint: {0}")]
	InvalidEndpoint(String),

	/// `/json/version` lookup failed.
	#[error("endpoint discovery failed: {0}")]
	Discovery(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns `true` when the error means the remote object no longer exists.
	///
	/// Closing something that is already gone is not a failure for callers that
	/// only want it gone.
	pub fn is_gone(&self) -> bool {
		match self {
			Error::ChannelClosed => true,
			// -32601 is "method not found", not a missing object
			Error::Protocol { code: -32601, .. } => false,
			Error::Protocol { message, .. } => {
				let message = message.to_ascii_lowercase();
				message.contains("no target")
					|| message.contains("not found")
					|| message.contains("failed to find")
					|| message.contains("no browser context")
			}
			_ => false,
		}
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		Error::Transport(err.to_string())
	}
}
