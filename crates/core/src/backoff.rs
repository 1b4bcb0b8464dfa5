//! Exponential backoff for host (re)connection.

use std::time::Duration;

/// Exponential backoff schedule.
///
/// The delay after failed attempt `n` (1-based) is
/// `initial_delay * factor^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
	pub initial_delay: Duration,
	pub max_delay: Duration,
	pub factor: u32,
	/// Attempts allowed for steady-state reconnection. The initial connect
	/// ignores this and retries until it succeeds or the pool shuts down.
	pub max_attempts: u32,
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial_delay: Duration::from_secs(1),
			max_delay: Duration::from_secs(30),
			factor: 2,
			max_attempts: 10,
		}
	}
}

impl BackoffConfig {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn initial_delay(mut self, delay: Duration) -> Self {
		self.initial_delay = delay;
		self
	}

	pub fn max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;
		self
	}

	pub fn factor(mut self, factor: u32) -> Self {
		self.factor = factor;
		self
	}

	pub fn max_attempts(mut self, attempts: u32) -> Self {
		self.max_attempts = attempts;
		self
	}

	/// Delay to wait after failed attempt `attempt` (1-based).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponent = attempt.saturating_sub(1);
		self.factor
			.checked_pow(exponent)
			.and_then(|multiplier| self.initial_delay.checked_mul(multiplier))
			.map_or(self.max_delay, |delay| delay.min(self.max_delay))
	}
}
