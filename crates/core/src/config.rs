//! Pool configuration.

use std::time::Duration;

use crate::backoff::BackoffConfig;
use crate::error::{PoolError, Result};
use crate::session::Retirement;

/// Sizing, retirement, and maintenance parameters for a [`SessionPool`](crate::SessionPool).
///
/// All configuration is passed in by the owning process; the pool never reads
/// files or the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
	/// Sessions created up front when the pool starts.
	pub min_size: usize,
	/// Upper bound on ready + checked-out sessions. The reconciler tops up to this.
	pub max_size: usize,
	/// Age after which a session is retired.
	pub ttl: Duration,
	/// Completed uses after which a session is retired.
	pub max_uses: u32,
	/// Pause between reconciler cycles.
	pub reconcile_interval: Duration,
	/// Reconnect schedule and cap.
	pub backoff: BackoffConfig,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			min_size: 4,
			max_size: 8,
			ttl: Duration::from_secs(600),
			max_uses: 200,
			reconcile_interval: Duration::from_secs(2),
			backoff: BackoffConfig::default(),
		}
	}
}

impl PoolConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn min_size(mut self, min: usize) -> Self {
		self.min_size = min;
		self
	}

	pub fn max_size(mut self, max: usize) -> Self {
		self.max_size = max;
		self
	}

	pub fn ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;
		self
	}

	pub fn max_uses(mut self, uses: u32) -> Self {
		self.max_uses = uses;
		self
	}

	pub fn reconcile_interval(mut self, interval: Duration) -> Self {
		self.reconcile_interval = interval;
		self
	}

	pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
		self.backoff = backoff;
		self
	}

	/// Checks `1 <= min_size <= max_size` and that limits and intervals are non-zero.
	pub fn validate(&self) -> Result<()> {
		if self.min_size == 0 {
			return Err(PoolError::InvalidConfig("min_size must be at least 1".to_string()));
		}
		if self.min_size > self.max_size {
			return Err(PoolError::InvalidConfig(format!(
				"min_size ({}) must not exceed max_size ({})",
				self.min_size, self.max_size
			)));
		}
		if self.ttl.is_zero() {
			return Err(PoolError::InvalidConfig("ttl must be non-zero".to_string()));
		}
		if self.max_uses == 0 {
			return Err(PoolError::InvalidConfig("max_uses must be at least 1".to_string()));
		}
		if self.reconcile_interval.is_zero() {
			return Err(PoolError::InvalidConfig("reconcile_interval must be non-zero".to_string()));
		}
		if self.backoff.max_attempts == 0 {
			return Err(PoolError::InvalidConfig("backoff.max_attempts must be at least 1".to_string()));
		}
		Ok(())
	}

	pub(crate) fn retirement(&self) -> Retirement {
		Retirement {
			ttl: self.ttl,
			max_uses: self.max_uses,
		}
	}
}
