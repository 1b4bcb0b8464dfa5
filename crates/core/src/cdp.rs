//! [`Host`] implementation for a Chrome DevTools Protocol browser.
//!
//! Each pooled session is an isolated browser context holding a single tab,
//! attached in flattened mode so page commands share the browser websocket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tabpool_protocol::{
	AttachToTarget, Command, CreateBrowserContext, CreateTarget, DisposeBrowserContext, Evaluate, Navigate, NavigateResult,
	SetDeviceMetricsOverride, SetDiscoverTargets,
};
use tabpool_runtime::{CdpConnection, DEFAULT_REQUEST_TIMEOUT, TransportParts, WebSocketTransport, resolve_ws_endpoint};
use tracing::{debug, info};

use crate::error::{PoolError, Result};
use crate::host::Host;

const BLANK_PAGE: &str = "about:blank";

/// Tab viewport in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

impl Default for Viewport {
	fn default() -> Self {
		Self { width: 512, height: 512 }
	}
}

#[derive(Debug, Clone)]
pub struct CdpHostOptions {
	/// Page every new tab opens on. `about:blank` when unset.
	pub base_url: Option<String>,
	/// Fixed viewport applied to every tab. Left to the browser when unset.
	pub viewport: Option<Viewport>,
	/// Per-command timeout, also used to bound the websocket dial.
	pub request_timeout: Duration,
}

impl Default for CdpHostOptions {
	fn default() -> Self {
		Self {
			base_url: None,
			viewport: Some(Viewport::default()),
			request_timeout: DEFAULT_REQUEST_TIMEOUT,
		}
	}
}

/// A browser reached over its DevTools websocket.
///
/// `endpoint` is either a `ws://` debugger URL or an `http://host:port`
/// address whose `/json/version` names one.
pub struct CdpHost {
	endpoint: String,
	options: CdpHostOptions,
	connection: RwLock<Option<Arc<CdpConnection>>>,
}

impl CdpHost {
	pub fn new(endpoint: impl Into<String>, options: CdpHostOptions) -> Self {
		Self {
			endpoint: endpoint.into(),
			options,
			connection: RwLock::new(None),
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// The live connection, if any.
	pub fn connection(&self) -> Option<Arc<CdpConnection>> {
		self.connection.read().clone()
	}

	fn current(&self) -> Result<Arc<CdpConnection>> {
		match self.connection() {
			Some(connection) if !connection.is_closed() => Ok(connection),
			_ => Err(PoolError::NotConnected),
		}
	}

	/// Resolves the endpoint and completes the websocket handshake.
	async fn dial(&self) -> tabpool_runtime::Result<TransportParts> {
		let ws_url = resolve_ws_endpoint(&self.endpoint).await?;
		debug!(target = "tabpool.cdp", url = %ws_url, "opening devtools websocket");
		let (transport, message_rx) = WebSocketTransport::connect(&ws_url).await?;
		Ok(transport.into_transport_parts(message_rx))
	}

	/// Once the message loop is spawned, every failure path closes the connection.
	async fn open_connection(&self) -> Result<Arc<CdpConnection>> {
		let parts = tokio::time::timeout(self.options.request_timeout, self.dial())
			.await
			.map_err(|_| PoolError::Host(format!("connecting to {} timed out", self.endpoint)))??;

		let connection = Arc::new(CdpConnection::new(parts, self.options.request_timeout));
		tokio::spawn({
			let connection = connection.clone();
			async move { connection.run().await }
		});

		if let Err(err) = connection.call(&SetDiscoverTargets { discover: true }, None).await {
			connection.close().await;
			return Err(err.into());
		}
		Ok(connection)
	}

	async fn open_tab(&self, connection: &CdpConnection, browser_context_id: &str) -> tabpool_runtime::Result<(String, String)> {
		let viewport = self.options.viewport;
		let target = connection
			.call(
				&CreateTarget {
					url: self.options.base_url.clone().unwrap_or_else(|| BLANK_PAGE.to_string()),
					width: viewport.map(|v| v.width),
					height: viewport.map(|v| v.height),
					browser_context_id: Some(browser_context_id.to_string()),
				},
				None,
			)
			.await?;

		let attached = connection
			.call(
				&AttachToTarget {
					target_id: target.target_id.clone(),
					flatten: true,
				},
				None,
			)
			.await?;

		if let Some(viewport) = viewport {
			connection
				.call(
					&SetDeviceMetricsOverride {
						width: viewport.width,
						height: viewport.height,
						device_scale_factor: 1.0,
						mobile: false,
					},
					Some(&attached.session_id),
				)
				.await?;
		}

		Ok((target.target_id, attached.session_id))
	}
}

#[async_trait]
impl Host for CdpHost {
	type Session = CdpSession;

	async fn connect(&self) -> Result<()> {
		let connection = self.open_connection().await?;

		let previous = self.connection.write().replace(connection);
		if let Some(previous) = previous {
			previous.close().await;
		}
		info!(target = "tabpool.cdp", endpoint = %self.endpoint, "browser connected");
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.connection.read().as_ref().is_some_and(|connection| !connection.is_closed())
	}

	async fn open_session(&self) -> Result<CdpSession> {
		let connection = self.current()?;
		let context = connection
			.call(&CreateBrowserContext { dispose_on_detach: Some(true) }, None)
			.await?;
		let browser_context_id = context.browser_context_id;

		match self.open_tab(&connection, &browser_context_id).await {
			Ok((target_id, session_id)) => {
				connection.track(&session_id, &target_id);
				debug!(target = "tabpool.cdp", target_id = %target_id, session = %session_id, "tab opened");
				Ok(CdpSession {
					connection,
					browser_context_id,
					target_id,
					session_id,
				})
			}
			Err(err) => {
				let dispose = DisposeBrowserContext {
					browser_context_id: browser_context_id.clone(),
				};
				if let Err(dispose_err) = connection.call(&dispose, None).await {
					debug!(target = "tabpool.cdp", context = %browser_context_id, error = %dispose_err, "cleanup after failed open");
				}
				Err(err.into())
			}
		}
	}

	fn is_session_alive(&self, session: &CdpSession) -> bool {
		let current = self.connection.read();
		let same_connection = current
			.as_ref()
			.is_some_and(|connection| Arc::ptr_eq(connection, &session.connection));
		same_connection && session.is_alive()
	}

	async fn close_session(&self, session: CdpSession) -> Result<()> {
		if session.connection.is_closed() {
			return Ok(());
		}

		let dispose = DisposeBrowserContext {
			browser_context_id: session.browser_context_id.clone(),
		};
		match session.connection.call(&dispose, None).await {
			Ok(_) => {}
			Err(err) if err.is_gone() => {
				debug!(target = "tabpool.cdp", context = %session.browser_context_id, "context already gone");
			}
			Err(err) => return Err(err.into()),
		}
		session.connection.forget(&session.session_id, &session.target_id);
		Ok(())
	}

	async fn disconnect(&self) {
		let previous = self.connection.write().take();
		if let Some(connection) = previous {
			connection.close().await;
			debug!(target = "tabpool.cdp", "browser connection closed");
		}
	}
}

/// One pooled tab in its own browser context.
pub struct CdpSession {
	connection: Arc<CdpConnection>,
	browser_context_id: String,
	target_id: String,
	session_id: String,
}

impl std::fmt::Debug for CdpSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CdpSession")
			.field("browser_context_id", &self.browser_context_id)
			.field("target_id", &self.target_id)
			.field("session_id", &self.session_id)
			.finish_non_exhaustive()
	}
}

impl CdpSession {
	pub fn browser_context_id(&self) -> &str {
		&self.browser_context_id
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	pub fn session_id(&self) -> &str {
		&self.session_id
	}

	/// Sends a raw command to this tab.
	pub async fn send(&self, method: &str, params: Value) -> tabpool_runtime::Result<Value> {
		self.connection.send(method, params, Some(&self.session_id)).await
	}

	/// Sends a typed command to this tab.
	pub async fn call<C: Command + Sync>(&self, command: &C) -> tabpool_runtime::Result<C::Response> {
		self.connection.call(command, Some(&self.session_id)).await
	}

	/// Navigates and fails if the browser reports a navigation error.
	pub async fn navigate(&self, url: &str) -> tabpool_runtime::Result<NavigateResult> {
		let result = self.call(&Navigate { url: url.to_string() }).await?;
		if let Some(error_text) = &result.error_text {
			return Err(tabpool_runtime::Error::Page(format!("navigation to {url} failed: {error_text}")));
		}
		Ok(result)
	}

	/// Evaluates `expression`, awaiting promises, and returns its value by value.
	pub async fn evaluate(&self, expression: &str) -> tabpool_runtime::Result<Value> {
		let result = self.call(&Evaluate::new(expression)).await?;
		if let Some(exception) = result.exception_details {
			let detail = result.result.description.unwrap_or(exception.text);
			return Err(tabpool_runtime::Error::Page(detail));
		}
		Ok(result.result.value.unwrap_or(Value::Null))
	}

	/// `false` once the browser reported the tab gone or the websocket closed.
	pub fn is_alive(&self) -> bool {
		!self.connection.is_closed()
			&& !self.connection.is_session_detached(&self.session_id)
			&& !self.connection.is_target_destroyed(&self.target_id)
	}
}
