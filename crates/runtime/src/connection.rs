//! Request/response correlation over a DevTools transport.
//!
//! The connection handles:
//! - Generating unique request ids
//! - Correlating responses with pending requests
//! - Routing commands to attached page sessions (`sessionId`)
//! - Tracking teardown events for the pages a caller [`track`](CdpConnection::track)s
//!
//! # Message Flow
//!
//! 1. Caller invokes [`CdpConnection::send`] with a method, params, and optional session
//! 2. The connection allocates an id and parks a oneshot sender under it
//! 3. The request is serialized and pushed through the transport
//! 4. [`CdpConnection::run`] receives the response and completes the oneshot
//!
//! When the transport ends or [`CdpConnection::close`] is called, every pending
//! request fails with [`Error::ChannelClosed`] and the connection reports itself
//! closed for good.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tabpool_protocol::{Command, DetachedFromTarget, INSPECTOR_DETACHED, Message, Request, TargetDestroyed};
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

type Callback = oneshot::Sender<Result<Value>>;

/// Default time to wait for a single response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Teardown events kept for ids nobody tracks yet.
const UNTRACKED_TEARDOWN_LIMIT: usize = 64;

/// Teardown state for tracked pages.
///
/// With target discovery on, the browser reports every page it has. Only
/// tracked ids are recorded; the rest land in a short ring so an event that
/// beats [`CdpConnection::track`] is not lost.
#[derive(Default)]
struct Teardown {
	sessions: HashSet<String>,
	targets: HashSet<String>,
	detached_sessions: HashSet<String>,
	destroyed_targets: HashSet<String>,
	recent_sessions: VecDeque<String>,
	recent_targets: VecDeque<String>,
}

impl Teardown {
	fn session_detached(&mut self, session_id: String) {
		if self.sessions.contains(&session_id) {
			self.detached_sessions.insert(session_id);
		} else {
			remember(&mut self.recent_sessions, session_id);
		}
	}

	fn target_destroyed(&mut self, target_id: String) {
		if self.targets.contains(&target_id) {
			self.destroyed_targets.insert(target_id);
		} else {
			remember(&mut self.recent_targets, target_id);
		}
	}

	fn track(&mut self, session_id: &str, target_id: &str) {
		self.sessions.insert(session_id.to_string());
		self.targets.insert(target_id.to_string());
		if take(&mut self.recent_sessions, session_id) {
			self.detached_sessions.insert(session_id.to_string());
		}
		if take(&mut self.recent_targets, target_id) {
			self.destroyed_targets.insert(target_id.to_string());
		}
	}

	fn forget(&mut self, session_id: &str, target_id: &str) {
		self.sessions.remove(session_id);
		self.targets.remove(target_id);
		self.detached_sessions.remove(session_id);
		self.destroyed_targets.remove(target_id);
	}

	fn len(&self) -> usize {
		self.detached_sessions.len() + self.destroyed_targets.len() + self.recent_sessions.len() + self.recent_targets.len()
	}
}

fn remember(recent: &mut VecDeque<String>, id: String) {
	if recent.len() == UNTRACKED_TEARDOWN_LIMIT {
		recent.pop_front();
	}
	recent.push_back(id);
}

fn take(recent: &mut VecDeque<String>, id: &str) -> bool {
	match recent.iter().position(|seen| seen == id) {
		Some(index) => {
			recent.remove(index);
			true
		}
		None => false,
	}
}

/// DevTools connection to one browser.
///
/// Shared across tasks behind an `Arc`. Locks guarding bookkeeping are never
/// held across an await; only the outbound transport uses an async lock.
pub struct CdpConnection {
	last_id: AtomicU32,
	callbacks: Mutex<HashMap<u32, Callback>>,
	sender: tokio::sync::Mutex<Box<dyn Transport>>,
	inbound: Mutex<Option<(Box<dyn TransportReceiver>, mpsc::UnboundedReceiver<Value>)>>,
	closed: AtomicBool,
	close_requested: Notify,
	teardown: Mutex<Teardown>,
	request_timeout: Duration,
}

impl CdpConnection {
	/// Creates a connection over `parts`. Nothing is read until [`run`](Self::run) is spawned.
	pub fn new(parts: TransportParts, request_timeout: Duration) -> Self {
		Self {
			last_id: AtomicU32::new(0),
			callbacks: Mutex::new(HashMap::new()),
			sender: tokio::sync::Mutex::new(parts.sender),
			inbound: Mutex::new(Some((parts.receiver, parts.message_rx))),
			closed: AtomicBool::new(false),
			close_requested: Notify::new(),
			teardown: Mutex::new(Teardown::default()),
			request_timeout,
		}
	}

	/// Sends a raw command and awaits its result.
	pub async fn send(&self, method: &str, params: Value, session_id: Option<&str>) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ChannelClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let request = serde_json::to_value(Request {
			id,
			method: method.to_string(),
			params,
			session_id: session_id.map(str::to_string),
		})?;

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().insert(id, tx);

		// mark_closed may have drained the map just before the insert
		if self.is_closed() {
			self.callbacks.lock().remove(&id);
			return Err(Error::ChannelClosed);
		}

		trace!(target = "tabpool.cdp", id, method, session = ?session_id, "request");
		if let Err(err) = self.sender.lock().await.send(request).await {
			self.callbacks.lock().remove(&id);
			return Err(err);
		}

		match tokio::time::timeout(self.request_timeout, rx).await {
			Ok(Ok(result)) => result,
			Ok(Err(_)) => Err(Error::ChannelClosed),
			Err(_) => {
				self.callbacks.lock().remove(&id);
				Err(Error::Timeout {
					method: method.to_string(),
					timeout: self.request_timeout,
				})
			}
		}
	}

	/// Sends a typed command and decodes its result.
	pub async fn call<C: Command>(&self, command: &C, session_id: Option<&str>) -> Result<C::Response> {
		let params = serde_json::to_value(command)?;
		let mut value = self.send(C::METHOD, params, session_id).await?;
		if value.is_null() {
			value = Value::Object(Default::default());
		}
		Ok(serde_json::from_value(value)?)
	}

	/// Runs the inbound message loop until the transport ends or
	/// [`close`](Self::close) is called.
	///
	/// Spawn this once per connection; a second call returns immediately.
	pub async fn run(&self) {
		let Some((receiver, mut message_rx)) = self.inbound.lock().take() else {
			warn!(target = "tabpool.cdp", "message loop already started");
			return;
		};

		let transport_task = tokio::spawn(async move {
			if let Err(err) = receiver.run().await {
				warn!(target = "tabpool.cdp", error = %err, "transport ended with error");
			}
		});

		loop {
			let value = tokio::select! {
				value = message_rx.recv() => value,
				_ = self.close_requested.notified() => {
					debug!(target = "tabpool.cdp", "message loop stopped by close");
					break;
				}
			};
			let Some(value) = value else {
				debug!(target = "tabpool.cdp", "message loop ended (transport closed)");
				break;
			};
			match serde_json::from_value::<Message>(value) {
				Ok(message) => self.dispatch(message),
				Err(err) => warn!(target = "tabpool.cdp", error = %err, "failed to parse message"),
			}
		}

		self.mark_closed();
		// a peer that never answers the close frame would keep the socket open
		transport_task.abort();
		let _ = transport_task.await;
	}

	fn dispatch(&self, message: Message) {
		match message {
			Message::Response(response) => {
				let Some(callback) = self.callbacks.lock().remove(&response.id) else {
					// late answer to a request that already timed out
					debug!(target = "tabpool.cdp", id = response.id, "response without pending request");
					return;
				};

				let result = match response.error {
					Some(error) => Err(Error::Protocol {
						code: error.code,
						message: error.message,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Message::Event(event) => match event.method.as_str() {
				TargetDestroyed::EVENT => match serde_json::from_value::<TargetDestroyed>(event.params) {
					Ok(destroyed) => {
						trace!(target = "tabpool.cdp", target_id = %destroyed.target_id, "target destroyed");
						self.teardown.lock().target_destroyed(destroyed.target_id);
					}
					Err(err) => warn!(target = "tabpool.cdp", error = %err, "malformed targetDestroyed"),
				},
				DetachedFromTarget::EVENT => match serde_json::from_value::<DetachedFromTarget>(event.params) {
					Ok(detached) => {
						trace!(target = "tabpool.cdp", session = %detached.session_id, "session detached");
						let mut teardown = self.teardown.lock();
						teardown.session_detached(detached.session_id);
						if let Some(target_id) = detached.target_id {
							teardown.target_destroyed(target_id);
						}
					}
					Err(err) => warn!(target = "tabpool.cdp", error = %err, "malformed detachedFromTarget"),
				},
				INSPECTOR_DETACHED => {
					if let Some(session_id) = event.session_id {
						trace!(target = "tabpool.cdp", session = %session_id, "inspector detached");
						self.teardown.lock().session_detached(session_id);
					}
				}
				method => trace!(target = "tabpool.cdp", method, "event"),
			},
		}
	}

	fn mark_closed(&self) {
		self.closed.store(true, Ordering::SeqCst);
		let pending: Vec<Callback> = self.callbacks.lock().drain().map(|(_, callback)| callback).collect();
		if !pending.is_empty() {
			debug!(target = "tabpool.cdp", count = pending.len(), "failing pending requests");
		}
		for callback in pending {
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}

	/// Closes the outbound side, fails anything still pending, and stops the
	/// message loop.
	pub async fn close(&self) {
		if let Err(err) = self.sender.lock().await.close().await {
			debug!(target = "tabpool.cdp", error = %err, "error closing transport");
		}
		self.mark_closed();
		// notify_one keeps a permit if the loop is not waiting yet
		self.close_requested.notify_one();
	}

	/// Returns `true` once the transport has ended or [`close`](Self::close) was called.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Starts recording teardown events for an attached page.
	pub fn track(&self, session_id: &str, target_id: &str) {
		self.teardown.lock().track(session_id, target_id);
	}

	/// Returns `true` if the browser reported this tracked page session as detached.
	pub fn is_session_detached(&self, session_id: &str) -> bool {
		self.teardown.lock().detached_sessions.contains(session_id)
	}

	/// Returns `true` if the browser reported this tracked target as destroyed.
	pub fn is_target_destroyed(&self, target_id: &str) -> bool {
		self.teardown.lock().destroyed_targets.contains(target_id)
	}

	/// Stops tracking a page that has been fully disposed.
	pub fn forget(&self, session_id: &str, target_id: &str) {
		self.teardown.lock().forget(session_id, target_id);
	}

	pub fn request_timeout(&self) -> Duration {
		self.request_timeout
	}

	#[cfg(test)]
	fn pending_requests(&self) -> usize {
		self.callbacks.lock().len()
	}

	#[cfg(test)]
	fn teardown_records(&self) -> usize {
		self.teardown.lock().len()
	}
}
