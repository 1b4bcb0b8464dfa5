//! DevTools runtime for tabpool.
//!
//! Owns everything between a browser's websocket and a typed command call:
//! the [`transport`] halves, the [`connection`] that correlates requests with
//! responses and tracks page teardown, and [`endpoint`] discovery.

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod fake_transport;
pub mod transport;

pub use connection::{CdpConnection, DEFAULT_REQUEST_TIMEOUT};
pub use endpoint::{fetch_version_info, resolve_ws_endpoint};
pub use error::{Error, Result};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
