//! In-memory host and hooks for pool tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tabpool::{BackoffConfig, Host, PoolConfig, PoolError, Result, SessionHooks};

#[derive(Debug)]
pub struct FakeSession {
	pub id: u64,
	generation: u64,
}

#[derive(Default)]
struct FakeState {
	connected: bool,
	refuse_connects: bool,
	refuse_opens: bool,
	panic_opens: usize,
	generation: u64,
	connect_attempts: u32,
	next_id: u64,
	open: HashSet<u64>,
	killed: HashSet<u64>,
	closed: Vec<u64>,
}

/// Scripted host. Clones share state, so tests keep one as a controller.
#[derive(Clone, Default)]
pub struct FakeHost {
	state: Arc<Mutex<FakeState>>,
}

impl FakeHost {
	pub fn new() -> Self {
		Self::default()
	}

	/// Drops the control channel as if the browser crashed.
	pub fn kill(&self) {
		self.state.lock().connected = false;
	}

	pub fn refuse_connects(&self, refuse: bool) {
		self.state.lock().refuse_connects = refuse;
	}

	pub fn refuse_opens(&self, refuse: bool) {
		self.state.lock().refuse_opens = refuse;
	}

	/// Makes the next `count` calls to `open_session` panic.
	pub fn panic_opens(&self, count: usize) {
		self.state.lock().panic_opens = count;
	}

	pub fn kill_session(&self, id: u64) {
		self.state.lock().killed.insert(id);
	}

	pub fn connect_attempts(&self) -> u32 {
		self.state.lock().connect_attempts
	}

	/// Ids of sessions still open on the host.
	pub fn open_sessions(&self) -> Vec<u64> {
		let mut open: Vec<u64> = self.state.lock().open.iter().copied().collect();
		open.sort_unstable();
		open
	}

	/// Ids passed to `close_session`, in call order.
	pub fn closed_sessions(&self) -> Vec<u64> {
		self.state.lock().closed.clone()
	}
}

#[async_trait]
impl Host for FakeHost {
	type Session = FakeSession;

	async fn connect(&self) -> Result<()> {
		let mut state = self.state.lock();
		state.connect_attempts += 1;
		if state.refuse_connects {
			return Err(PoolError::Host("connection refused".to_string()));
		}
		state.connected = true;
		state.generation += 1;
		Ok(())
	}

	fn is_connected(&self) -> bool {
		self.state.lock().connected
	}

	async fn open_session(&self) -> Result<FakeSession> {
		let mut state = self.state.lock();
		if !state.connected {
			return Err(PoolError::NotConnected);
		}
		if state.refuse_opens {
			return Err(PoolError::Host("target creation failed".to_string()));
		}
		if state.panic_opens > 0 {
			state.panic_opens -= 1;
			drop(state);
			panic!("host bug while opening session");
		}
		state.next_id += 1;
		let id = state.next_id;
		state.open.insert(id);
		Ok(FakeSession {
			id,
			generation: state.generation,
		})
	}

	fn is_session_alive(&self, session: &FakeSession) -> bool {
		let state = self.state.lock();
		state.connected
			&& state.generation == session.generation
			&& state.open.contains(&session.id)
			&& !state.killed.contains(&session.id)
	}

	async fn close_session(&self, session: FakeSession) -> Result<()> {
		let mut state = self.state.lock();
		state.open.remove(&session.id);
		state.closed.push(session.id);
		Ok(())
	}

	async fn disconnect(&self) {
		let mut state = self.state.lock();
		state.connected = false;
		// the browser drops every context with the channel
		state.open.clear();
	}
}

/// Hooks that count calls and can be told to veto or fail.
#[derive(Clone, Default)]
pub struct RecordingHooks {
	pub admitted: Arc<AtomicUsize>,
	pub returned: Arc<AtomicUsize>,
	pub veto_next: Arc<AtomicUsize>,
	pub panic_next: Arc<AtomicUsize>,
	pub fail_return: Arc<AtomicBool>,
}

#[async_trait]
impl SessionHooks<FakeSession> for RecordingHooks {
	async fn admit(&self, _session: &FakeSession) -> bool {
		let panics = self
			.panic_next
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		if panics {
			panic!("admission hook bug");
		}
		let vetoed = self
			.veto_next
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
			.is_ok();
		if !vetoed {
			self.admitted.fetch_add(1, Ordering::SeqCst);
		}
		!vetoed
	}

	async fn before_return(&self, _session: &FakeSession) -> Result<()> {
		self.returned.fetch_add(1, Ordering::SeqCst);
		if self.fail_return.load(Ordering::SeqCst) {
			return Err(PoolError::Hook("reset script failed".to_string()));
		}
		Ok(())
	}
}

pub fn config(min: usize, max: usize) -> PoolConfig {
	PoolConfig::new()
		.min_size(min)
		.max_size(max)
		.reconcile_interval(Duration::from_secs(2))
		.backoff(
			BackoffConfig::new()
				.initial_delay(Duration::from_secs(1))
				.max_delay(Duration::from_secs(4))
				.max_attempts(3),
		)
}

/// Polls `condition` every 100ms of (usually paused) time.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
	for _ in 0..2_000 {
		if condition() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(100)).await;
	}
	panic!("timed out waiting for {what}");
}
