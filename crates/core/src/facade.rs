//! Public scoped-acquisition API.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::host::{Host, HostConnection, NoHooks, SessionHooks};
use crate::phase::{PhaseCell, PoolPhase};
use crate::pool::{Pool, Release};
use crate::reconciler::{Reconciler, ReconcilerTask};
use crate::session::{RetireReason, SessionHandle};

/// Point-in-time view of a [`SessionPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
	pub phase: PoolPhase,
	pub ready: usize,
	pub total: usize,
	pub min_size: usize,
	pub max_size: usize,
	pub host_connected: bool,
}

/// A pool of remote sessions kept warm in the background.
///
/// ```ignore
/// let pool = SessionPool::new(CdpHost::new(endpoint, CdpHostOptions::default()), PoolConfig::default())?;
/// pool.start().await?;
/// let title = pool
/// 	.with_session(|tab| Box::pin(async move { tab.evaluate("document.title").await }))
/// 	.await?;
/// pool.shutdown().await;
/// ```
pub struct SessionPool<H: Host> {
	config: PoolConfig,
	pool: Arc<Pool<H::Session>>,
	host: Arc<HostConnection<H>>,
	phase: Arc<PhaseCell>,
	reconciler: tokio::sync::Mutex<Option<ReconcilerTask>>,
	started: AtomicBool,
	shut_down: AtomicBool,
}

impl<H: Host> SessionPool<H> {
	/// Creates a pool with no hooks. Nothing connects until [`start`](Self::start).
	pub fn new(host: H, config: PoolConfig) -> Result<Self> {
		Self::with_hooks(host, NoHooks, config)
	}

	pub fn with_hooks(host: H, hooks: impl SessionHooks<H::Session>, config: PoolConfig) -> Result<Self> {
		config.validate()?;
		let hooks: Arc<dyn SessionHooks<H::Session>> = Arc::new(hooks);
		Ok(Self {
			pool: Arc::new(Pool::new(config.max_size, config.retirement())),
			host: Arc::new(HostConnection::new(host, hooks, config.backoff)),
			phase: Arc::new(PhaseCell::new()),
			reconciler: tokio::sync::Mutex::new(None),
			started: AtomicBool::new(false),
			shut_down: AtomicBool::new(false),
			config,
		})
	}

	pub fn config(&self) -> &PoolConfig {
		&self.config
	}

	pub fn host(&self) -> &H {
		self.host.host()
	}

	/// Connects to the host, creates `min_size` sessions, and starts the reconciler.
	///
	/// Retries the initial connect until it succeeds or [`shutdown`](Self::shutdown)
	/// is called. Calling `start` again is a no-op.
	pub async fn start(&self) -> Result<()> {
		if self.shut_down.load(Ordering::SeqCst) {
			return Err(PoolError::Closed);
		}
		if self.started.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		// held for the whole start so shutdown cannot miss the task
		let mut slot = self.reconciler.lock().await;
		info!(
			target = "tabpool.pool",
			min_size = self.config.min_size,
			max_size = self.config.max_size,
			"starting session pool"
		);

		self.host.connect_initial().await?;

		let reconciler = Reconciler::new(self.pool.clone(), self.host.clone(), self.phase.clone());
		let created = reconciler.fill(self.config.min_size).await;
		if self.pool.is_closed() {
			return Err(PoolError::Closed);
		}
		if created < self.config.min_size {
			warn!(target = "tabpool.pool", created, min_size = self.config.min_size, "initial fill came up short");
		}

		self.phase.set(PoolPhase::Steady);
		*slot = Some(reconciler.spawn(self.config.reconcile_interval));
		info!(target = "tabpool.pool", sessions = created, "session pool ready");
		Ok(())
	}

	/// Runs `f` with exclusive use of one pooled session.
	///
	/// Waits for a free session without a deadline; dead sessions found at
	/// checkout are discarded and the wait continues. After `f` completes the
	/// pre-return hook runs and the session is released exactly once, whether
	/// `f` succeeded or not. Errors from `f` are returned unchanged.
	///
	/// If the returned future is dropped or `f` panics while holding the
	/// session, the session is discarded and closed in the background.
	pub async fn with_session<T, E, F>(&self, f: F) -> std::result::Result<T, E>
	where
		F: for<'s> FnOnce(&'s H::Session) -> BoxFuture<'s, std::result::Result<T, E>>,
		E: From<PoolError>,
	{
		let lease = self.checkout().await.map_err(E::from)?;
		let outcome = f(lease.session()).await;
		lease.finish().await;
		outcome
	}

	async fn checkout(&self) -> Result<Lease<H>> {
		loop {
			let handle = self.pool.acquire().await?;
			let lease = Lease::new(self.pool.clone(), self.host.clone(), handle);
			if lease.is_alive() {
				return Ok(lease);
			}
			lease.discard(RetireReason::Unhealthy).await;
		}
	}

	pub fn phase(&self) -> PoolPhase {
		self.phase.get()
	}

	pub fn status(&self) -> PoolStatus {
		let report = self.pool.size_report();
		PoolStatus {
			phase: self.phase.get(),
			ready: report.ready,
			total: report.total,
			min_size: self.config.min_size,
			max_size: self.config.max_size,
			host_connected: self.host.is_alive(),
		}
	}

	/// Stops the reconciler after its current cycle, closes every pooled
	/// session, and disconnects from the host.
	///
	/// Suspended callers of [`with_session`](Self::with_session) fail with
	/// [`PoolError::Closed`]. Sessions still checked out are closed when their
	/// callers finish. Later calls are no-ops.
	pub async fn shutdown(&self) {
		if self.shut_down.swap(true, Ordering::SeqCst) {
			return;
		}
		info!(target = "tabpool.pool", "shutting down session pool");

		self.host.begin_close();
		let task = self.reconciler.lock().await.take();
		if let Some(task) = task {
			task.stop().await;
		}

		self.phase.set(PoolPhase::Shutdown);
		let remaining = self.pool.close();
		debug!(target = "tabpool.pool", sessions = remaining.len(), "closing pooled sessions");
		for handle in remaining {
			self.host.destroy_session(handle, RetireReason::Shutdown).await;
		}
		self.host.close().await;
		info!(target = "tabpool.pool", "session pool shut down");
	}
}

impl<H: Host> Drop for SessionPool<H> {
	fn drop(&mut self) {
		if !self.shut_down.load(Ordering::SeqCst) {
			self.host.begin_close();
		}
	}
}

/// A checked-out session. Releases on [`finish`](Self::finish); discards on drop.
struct Lease<H: Host> {
	pool: Arc<Pool<H::Session>>,
	host: Arc<HostConnection<H>>,
	handle: Option<SessionHandle<H::Session>>,
}

impl<H: Host> Lease<H> {
	fn new(pool: Arc<Pool<H::Session>>, host: Arc<HostConnection<H>>, handle: SessionHandle<H::Session>) -> Self {
		Self {
			pool,
			host,
			handle: Some(handle),
		}
	}

	fn handle(&self) -> &SessionHandle<H::Session> {
		match &self.handle {
			Some(handle) => handle,
			None => unreachable!("lease used after release"),
		}
	}

	fn session(&self) -> &H::Session {
		self.handle().session()
	}

	fn is_alive(&self) -> bool {
		self.host.session_alive(self.handle())
	}

	/// Releases without counting a use.
	async fn discard(mut self, reason: RetireReason) {
		let Some(handle) = self.handle.take() else {
			return;
		};
		debug!(target = "tabpool.pool", session = %handle.id(), reason = %reason, "discarding session at checkout");
		if let Release::Retire(handle, _) = self.pool.release(handle, false) {
			self.host.destroy_session(handle, reason).await;
		}
	}

	/// Runs the return checks, counts the use, and releases.
	async fn finish(mut self) {
		let healthy = self.return_check().await;
		let Some(mut handle) = self.handle.take() else {
			return;
		};
		handle.record_use();
		match self.pool.release(handle, healthy) {
			Release::Pooled => {}
			Release::Retire(handle, reason) => self.host.destroy_session(handle, reason).await,
		}
	}

	async fn return_check(&self) -> bool {
		if !self.is_alive() {
			return false;
		}
		if let Err(err) = self.host.before_return(self.handle()).await {
			warn!(target = "tabpool.pool", session = %self.handle().id(), error = %err, "pre-return hook failed");
			return false;
		}
		// the hook may have killed the session
		self.is_alive()
	}
}

impl<H: Host> Drop for Lease<H> {
	fn drop(&mut self) {
		let Some(mut handle) = self.handle.take() else {
			return;
		};
		handle.record_use();
		let Release::Retire(handle, _) = self.pool.release(handle, false) else {
			return;
		};

		let id = handle.id();
		match Handle::try_current() {
			Ok(runtime) => {
				debug!(target = "tabpool.pool", session = %id, "session abandoned mid-use, closing in background");
				let host = self.host.clone();
				runtime.spawn(async move {
					host.destroy_session(handle, RetireReason::Cancelled).await;
				});
			}
			Err(_) => warn!(target = "tabpool.pool", session = %id, "session abandoned outside a runtime, not closed"),
		}
	}
}
