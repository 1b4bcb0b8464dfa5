//! Background maintenance loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{PoolError, panic_message};
use crate::host::{Host, HostConnection};
use crate::phase::{PhaseCell, PoolPhase};
use crate::pool::Pool;
use crate::session::RetireReason;

/// Keeps the pool at target size, evicts stale sessions, and restores the host.
pub(crate) struct Reconciler<H: Host> {
	pool: Arc<Pool<H::Session>>,
	host: Arc<HostConnection<H>>,
	phase: Arc<PhaseCell>,
}

impl<H: Host> Reconciler<H> {
	pub fn new(pool: Arc<Pool<H::Session>>, host: Arc<HostConnection<H>>, phase: Arc<PhaseCell>) -> Self {
		Self { pool, host, phase }
	}

	/// One maintenance pass: top-up, eviction, host health, in that order.
	///
	/// Each step tolerates failure of the others, including a panic.
	pub async fn run_cycle(&self) {
		guarded("fill", self.fill(self.pool.max_size())).await;
		guarded("evict", self.evict()).await;
		guarded("check_host", self.check_host()).await;

		let report = self.pool.size_report();
		debug!(
			target = "tabpool.reconciler",
			ready = report.ready,
			total = report.total,
			phase = %self.phase.get(),
			"cycle complete"
		);
	}

	/// Creates sessions until the pool holds `target` of them.
	///
	/// Makes at most one attempt per missing session, so a host that keeps
	/// vetoing or failing cannot stall the cycle. Stops early if the host dies.
	pub async fn fill(&self, target: usize) -> usize {
		let deficit = target.min(self.pool.max_size()).saturating_sub(self.pool.size_report().total);
		let mut added = 0;

		for _ in 0..deficit {
			if self.pool.is_closed() || !self.host.is_alive() {
				break;
			}
			match self.host.create_session().await {
				Ok(Some(handle)) => match self.pool.try_add(handle) {
					Ok(()) => added += 1,
					Err(handle) => {
						self.host.destroy_session(handle, RetireReason::Overflow).await;
						break;
					}
				},
				Ok(None) => {}
				Err(err) => warn!(target = "tabpool.reconciler", error = %err, "failed to create session"),
			}
		}

		if added > 0 {
			debug!(target = "tabpool.reconciler", added, "topped up pool");
		}
		added
	}

	async fn evict(&self) {
		let expired = self.pool.evict_expired(Instant::now());
		for (handle, reason) in expired {
			self.host.destroy_session(handle, reason).await;
		}
	}

	async fn check_host(&self) {
		if self.host.is_closing() || self.pool.is_closed() {
			return;
		}
		if self.host.is_alive() {
			self.phase.set(PoolPhase::Steady);
			return;
		}

		self.phase.set(PoolPhase::Degraded);
		let discarded = self.pool.drain();
		warn!(target = "tabpool.reconciler", discarded = discarded.len(), "host unhealthy, discarding sessions");
		for handle in discarded {
			self.host.destroy_session(handle, RetireReason::HostReset).await;
		}

		match self.host.reconnect().await {
			Ok(()) => {
				self.phase.set(PoolPhase::Steady);
			}
			Err(PoolError::Closed) => {}
			Err(err) => {
				error!(target = "tabpool.reconciler", error = %err, "host reconnect exhausted, pool stays degraded");
			}
		}
	}

	/// Runs cycles every `interval` until stopped. The first cycle runs after one interval.
	pub fn spawn(self, interval: Duration) -> ReconcilerTask {
		let (stop, mut stopped) = watch::channel(false);
		let handle = tokio::spawn(async move {
			info!(target = "tabpool.reconciler", interval_ms = interval.as_millis() as u64, "reconciler started");
			loop {
				tokio::select! {
					_ = tokio::time::sleep(interval) => {}
					_ = stopped.wait_for(|stop| *stop) => break,
				}
				if *stopped.borrow() {
					break;
				}
				self.run_cycle().await;
			}
			info!(target = "tabpool.reconciler", "reconciler stopped");
		});
		ReconcilerTask { stop, handle: Some(handle) }
	}
}

/// Runs one cycle step, logging a panic instead of unwinding into the loop.
async fn guarded<T>(step: &'static str, future: impl Future<Output = T>) -> Option<T> {
	match AssertUnwindSafe(future).catch_unwind().await {
		Ok(output) => Some(output),
		Err(panic) => {
			error!(target = "tabpool.reconciler", step, panic = panic_message(panic.as_ref()), "cycle step panicked");
			None
		}
	}
}

/// Handle to a running reconciler loop. Dropping it signals the loop to stop
/// after its current cycle.
pub(crate) struct ReconcilerTask {
	stop: watch::Sender<bool>,
	handle: Option<JoinHandle<()>>,
}

impl ReconcilerTask {
	/// Signals the loop and waits for the current cycle to finish.
	pub async fn stop(mut self) {
		self.stop.send_replace(true);
		let Some(handle) = self.handle.take() else {
			return;
		};
		if let Err(err) = handle.await {
			if err.is_panic() {
				error!(target = "tabpool.reconciler", "reconciler panicked");
			}
		}
	}
}

impl Drop for ReconcilerTask {
	fn drop(&mut self) {
		self.stop.send_replace(true);
	}
}
