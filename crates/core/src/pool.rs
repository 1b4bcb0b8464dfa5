//! Bounded session bookkeeping.
//!
//! [`Pool`] is the single monitor over the ready queue and the set of
//! checked-out sessions. Every operation takes the lock, mutates, and releases
//! it without awaiting, so bookkeeping is atomic with respect to task
//! suspension. Waiting for a free session happens outside the lock on a
//! [`Notify`].
//!
//! The pool never talks to the host. Anything it removes is handed back to
//! the caller, who is responsible for destroying it.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{PoolError, Result};
use crate::session::{RetireReason, Retirement, SessionHandle, SessionId};

/// Ready and total session counts taken under one lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeReport {
	pub ready: usize,
	pub total: usize,
}

/// Outcome of [`Pool::release`].
#[derive(Debug)]
pub enum Release<S> {
	/// The session went back to the ready queue.
	Pooled,
	/// The session left the pool and must be destroyed by the caller.
	Retire(SessionHandle<S>, RetireReason),
}

#[derive(Debug, Clone, Copy)]
struct CheckedOut {
	created_at: Instant,
	use_count: u32,
	retire: Option<RetireReason>,
}

struct PoolState<S> {
	ready: VecDeque<SessionHandle<S>>,
	active: HashMap<SessionId, CheckedOut>,
	closed: bool,
}

impl<S> PoolState<S> {
	fn total(&self) -> usize {
		self.ready.len() + self.active.len()
	}
}

/// Bounded FIFO of ready sessions plus the set of checked-out ones.
///
/// `ready + active <= max_size` holds at every observation, and a session id is
/// never in both at once.
pub struct Pool<S> {
	state: Mutex<PoolState<S>>,
	available: Notify,
	max_size: usize,
	retirement: Retirement,
}

impl<S> Pool<S> {
	pub(crate) fn new(max_size: usize, retirement: Retirement) -> Self {
		Self {
			state: Mutex::new(PoolState {
				ready: VecDeque::new(),
				active: HashMap::new(),
				closed: false,
			}),
			available: Notify::new(),
			max_size,
			retirement,
		}
	}

	pub fn max_size(&self) -> usize {
		self.max_size
	}

	/// Adds a freshly created session if there is room.
	///
	/// A full or closed pool hands the session back so the caller can destroy it.
	pub fn try_add(&self, handle: SessionHandle<S>) -> std::result::Result<(), SessionHandle<S>> {
		{
			let mut state = self.state.lock();
			if state.closed || state.total() >= self.max_size {
				return Err(handle);
			}
			state.ready.push_back(handle);
		}
		self.available.notify_one();
		Ok(())
	}

	/// Takes the oldest ready session, waiting until one is available.
	///
	/// Waiters are served in arrival order. Dropping the returned future never
	/// loses a session: the dequeue happens synchronously once the waiter is
	/// polled, and a wakeup consumed by a dropped waiter passes to the next one.
	///
	/// Returns [`PoolError::Closed`] once the pool is closed, including for
	/// callers that were already waiting.
	pub async fn acquire(&self) -> Result<SessionHandle<S>> {
		loop {
			let notified = self.available.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();

			if let Some(handle) = self.try_acquire()? {
				return Ok(handle);
			}
			notified.await;
		}
	}

	/// Non-waiting variant of [`acquire`](Self::acquire).
	pub fn try_acquire(&self) -> Result<Option<SessionHandle<S>>> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(PoolError::Closed);
		}
		let Some(handle) = state.ready.pop_front() else {
			return Ok(None);
		};
		state.active.insert(
			handle.id(),
			CheckedOut {
				created_at: handle.created_at(),
				use_count: handle.use_count(),
				retire: None,
			},
		);
		Ok(Some(handle))
	}

	/// Returns a checked-out session.
	///
	/// The session is re-queued only if it is healthy, still tracked, not
	/// flagged by eviction, and within its age and use limits.
	pub fn release(&self, handle: SessionHandle<S>, healthy: bool) -> Release<S> {
		let mut state = self.state.lock();
		let entry = state.active.remove(&handle.id());

		let reason = if state.closed {
			Some(RetireReason::Shutdown)
		} else if let Some(entry) = entry {
			if !healthy {
				Some(RetireReason::Unhealthy)
			} else {
				entry
					.retire
					.or_else(|| self.retirement.check(handle.created_at(), handle.use_count(), Instant::now()))
			}
		} else {
			// bookkeeping was reset while the session was out
			Some(RetireReason::HostReset)
		};

		if let Some(reason) = reason {
			return Release::Retire(handle, reason);
		}

		state.ready.push_back(handle);
		drop(state);
		self.available.notify_one();
		Release::Pooled
	}

	pub fn size_report(&self) -> SizeReport {
		let state = self.state.lock();
		SizeReport {
			ready: state.ready.len(),
			total: state.total(),
		}
	}

	/// Removes ready sessions past their limits and flags checked-out ones.
	///
	/// Flagged sessions stay with their caller and are retired on release.
	pub fn evict_expired(&self, now: Instant) -> Vec<(SessionHandle<S>, RetireReason)> {
		let mut state = self.state.lock();
		let mut expired = Vec::new();
		let mut kept = VecDeque::with_capacity(state.ready.len());

		for handle in state.ready.drain(..) {
			match self.retirement.check(handle.created_at(), handle.use_count(), now) {
				Some(reason) => expired.push((handle, reason)),
				None => kept.push_back(handle),
			}
		}
		state.ready = kept;

		for entry in state.active.values_mut() {
			if entry.retire.is_none() {
				entry.retire = self.retirement.check(entry.created_at, entry.use_count, now);
			}
		}

		expired
	}

	/// Forgets every session. Ready ones are returned; checked-out ones are
	/// retired when their callers release them.
	pub fn drain(&self) -> Vec<SessionHandle<S>> {
		let mut state = self.state.lock();
		state.active.clear();
		state.ready.drain(..).collect()
	}

	/// Drains the pool and refuses all further adds and acquires.
	///
	/// Suspended acquirers wake up with [`PoolError::Closed`].
	pub fn close(&self) -> Vec<SessionHandle<S>> {
		let drained = {
			let mut state = self.state.lock();
			state.closed = true;
			state.active.clear();
			state.ready.drain(..).collect()
		};
		self.available.notify_waiters();
		drained
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Ids currently ready (in queue order) and checked out.
	#[cfg(test)]
	pub fn snapshot(&self) -> (Vec<SessionId>, Vec<SessionId>) {
		let state = self.state.lock();
		let ready = state.ready.iter().map(SessionHandle::id).collect();
		let active = state.active.keys().copied().collect();
		(ready, active)
	}
}
