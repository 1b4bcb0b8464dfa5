//! Pool lifecycle phase.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

/// Coarse lifecycle state reported by [`SessionPool::phase`](crate::SessionPool::phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolPhase {
	/// Created, or `start` still connecting and filling.
	Initializing,
	/// Host connected, reconciler running.
	Steady,
	/// Host lost; sessions drained and reconnection in progress.
	Degraded,
	/// Terminal.
	Shutdown,
}

impl fmt::Display for PoolPhase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Initializing => "initializing",
			Self::Steady => "steady",
			Self::Degraded => "degraded",
			Self::Shutdown => "shutdown",
		})
	}
}

/// Shared phase cell. Once `Shutdown` is stored it never changes.
#[derive(Debug)]
pub(crate) struct PhaseCell {
	inner: Mutex<PoolPhase>,
}

impl PhaseCell {
	pub fn new() -> Self {
		Self {
			inner: Mutex::new(PoolPhase::Initializing),
		}
	}

	pub fn get(&self) -> PoolPhase {
		*self.inner.lock()
	}

	/// Returns `false` when the transition was refused.
	pub fn set(&self, next: PoolPhase) -> bool {
		let mut phase = self.inner.lock();
		if *phase == PoolPhase::Shutdown {
			return next == PoolPhase::Shutdown;
		}
		let previous = *phase;
		if previous != next {
			info!(target = "tabpool.pool", from = %previous, to = %next, "pool phase changed");
			*phase = next;
		}
		true
	}
}
