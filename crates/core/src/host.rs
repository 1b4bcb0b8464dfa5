//! The remote host abstraction and the connection wrapper the pool drives.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffConfig;
use crate::error::{PoolError, Result, panic_message};
use crate::session::{RetireReason, SessionHandle};

/// A remote process that hands out isolated sessions over one control channel.
///
/// Implementations keep at most one live channel. `connect` replaces any
/// previous channel; sessions opened on the old one are gone afterwards.
#[async_trait]
pub trait Host: Send + Sync + 'static {
	type Session: Send + Sync + 'static;

	/// Opens (or reopens) the control channel.
	async fn connect(&self) -> Result<()>;

	/// Non-blocking health check. `false` when no channel exists or it reports disconnection.
	fn is_connected(&self) -> bool;

	async fn open_session(&self) -> Result<Self::Session>;

	fn is_session_alive(&self, session: &Self::Session) -> bool;

	/// Closes a session. Closing one that is already gone must succeed.
	async fn close_session(&self, session: Self::Session) -> Result<()>;

	/// Tears down the control channel.
	async fn disconnect(&self);
}

/// Caller-supplied checks run around a session's lifetime in the pool.
#[async_trait]
pub trait SessionHooks<S>: Send + Sync + 'static
where
	S: Send + Sync + 'static,
{
	/// Runs once on a new session. Returning `false` destroys it before it joins the pool.
	async fn admit(&self, _session: &S) -> bool {
		true
	}

	/// Runs on every release before the session is requeued. An error discards the session.
	async fn before_return(&self, _session: &S) -> Result<()> {
		Ok(())
	}
}

/// Hooks that admit everything and reset nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

#[async_trait]
impl<S: Send + Sync + 'static> SessionHooks<S> for NoHooks {}

/// Owns the [`Host`], its hooks, and the reconnect policy.
pub(crate) struct HostConnection<H: Host> {
	host: H,
	hooks: Arc<dyn SessionHooks<H::Session>>,
	backoff: BackoffConfig,
	closing: watch::Sender<bool>,
}

impl<H: Host> HostConnection<H> {
	pub fn new(host: H, hooks: Arc<dyn SessionHooks<H::Session>>, backoff: BackoffConfig) -> Self {
		Self {
			host,
			hooks,
			backoff,
			closing: watch::Sender::new(false),
		}
	}

	pub fn host(&self) -> &H {
		&self.host
	}

	/// Connects for the first time, retrying without limit until it succeeds or
	/// the connection is closed.
	pub async fn connect_initial(&self) -> Result<()> {
		let mut attempt: u32 = 0;
		loop {
			if self.is_closing() {
				return Err(PoolError::Closed);
			}
			attempt = attempt.saturating_add(1);
			match self.host.connect().await {
				Ok(()) => {
					info!(target = "tabpool.host", attempt, "host connected");
					return Ok(());
				}
				Err(err) => {
					let delay = self.backoff.delay_for(attempt);
					warn!(
						target = "tabpool.host",
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %err,
						"initial connect failed, retrying"
					);
					if !self.sleep_unless_closing(delay).await {
						return Err(PoolError::Closed);
					}
				}
			}
		}
	}

	/// Drops the current channel and reconnects, giving up after
	/// `backoff.max_attempts` attempts.
	pub async fn reconnect(&self) -> Result<()> {
		self.host.disconnect().await;

		let max_attempts = self.backoff.max_attempts.max(1);
		let mut last_error = String::new();
		for attempt in 1..=max_attempts {
			if self.is_closing() {
				return Err(PoolError::Closed);
			}
			match self.host.connect().await {
				Ok(()) => {
					info!(target = "tabpool.host", attempt, "host reconnected");
					return Ok(());
				}
				Err(err) => {
					warn!(target = "tabpool.host", attempt, max_attempts, error = %err, "reconnect failed");
					last_error = err.to_string();
				}
			}
			if attempt < max_attempts && !self.sleep_unless_closing(self.backoff.delay_for(attempt)).await {
				return Err(PoolError::Closed);
			}
		}

		Err(PoolError::ConnectExhausted {
			attempts: max_attempts,
			last_error,
		})
	}

	/// Sleeps for `delay`; returns `false` if closing began first.
	async fn sleep_unless_closing(&self, delay: Duration) -> bool {
		let mut closing = self.closing.subscribe();
		tokio::select! {
			_ = tokio::time::sleep(delay) => true,
			_ = closing.wait_for(|closing| *closing) => false,
		}
	}

	/// Opens a session and runs the admission hook.
	///
	/// `Ok(None)` means the hook vetoed the session; it has already been destroyed.
	pub async fn create_session(&self) -> Result<Option<SessionHandle<H::Session>>> {
		let session = self.host.open_session().await?;
		let admitted = match AssertUnwindSafe(self.hooks.admit(&session)).catch_unwind().await {
			Ok(admitted) => admitted,
			Err(panic) => {
				error!(target = "tabpool.host", panic = panic_message(panic.as_ref()), "admission hook panicked");
				false
			}
		};
		if !admitted {
			debug!(target = "tabpool.host", "admission hook rejected session");
			if let Err(err) = self.host.close_session(session).await {
				warn!(target = "tabpool.host", error = %err, "failed to close rejected session");
			}
			return Ok(None);
		}

		let handle = SessionHandle::new(session);
		debug!(target = "tabpool.host", session = %handle.id(), "session created");
		Ok(Some(handle))
	}

	/// Closes the remote side of a retired session. Failures are logged, never raised.
	pub async fn destroy_session(&self, handle: SessionHandle<H::Session>, reason: RetireReason) {
		let id = handle.id();
		let uses = handle.use_count();
		debug!(target = "tabpool.host", session = %id, uses, reason = %reason, "destroying session");
		if let Err(err) = self.host.close_session(handle.into_session()).await {
			warn!(target = "tabpool.host", session = %id, error = %err, "failed to close session");
		}
	}

	pub fn session_alive(&self, handle: &SessionHandle<H::Session>) -> bool {
		self.is_alive() && self.host.is_session_alive(handle.session())
	}

	pub async fn before_return(&self, handle: &SessionHandle<H::Session>) -> Result<()> {
		self.hooks.before_return(handle.session()).await
	}

	pub fn is_alive(&self) -> bool {
		!self.is_closing() && self.host.is_connected()
	}

	pub fn is_closing(&self) -> bool {
		*self.closing.borrow()
	}

	/// Interrupts any backoff sleep and refuses further connects.
	pub fn begin_close(&self) {
		self.closing.send_replace(true);
	}

	pub async fn close(&self) {
		self.begin_close();
		self.host.disconnect().await;
		info!(target = "tabpool.host", "host connection closed");
	}
}
