//! Pooled session handles and retirement policy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier assigned when a session joins the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
	pub(crate) fn next() -> Self {
		Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
	}

	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "session-{}", self.0)
	}
}

/// A host session together with the bookkeeping the pool needs.
///
/// `created_at` never changes; `use_count` only grows, once per completed use.
#[derive(Debug)]
pub struct SessionHandle<S> {
	id: SessionId,
	session: S,
	created_at: Instant,
	use_count: u32,
}

impl<S> SessionHandle<S> {
	pub fn new(session: S) -> Self {
		Self {
			id: SessionId::next(),
			session,
			created_at: Instant::now(),
			use_count: 0,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn session(&self) -> &S {
		&self.session
	}

	pub fn created_at(&self) -> Instant {
		self.created_at
	}

	pub fn use_count(&self) -> u32 {
		self.use_count
	}

	pub fn age(&self) -> Duration {
		self.created_at.elapsed()
	}

	pub(crate) fn record_use(&mut self) {
		self.use_count = self.use_count.saturating_add(1);
	}

	pub fn into_session(self) -> S {
		self.session
	}
}

/// Why a session left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
	MaxUses,
	MaxAge,
	Unhealthy,
	/// The host connection was reset while the session was checked out.
	HostReset,
	Shutdown,
	/// The caller's future was dropped or panicked while holding the session.
	Cancelled,
	/// Created but refused, e.g. the pool was already full or closed.
	Overflow,
	Rejected,
}

impl fmt::Display for RetireReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::MaxUses => "maximum uses",
			Self::MaxAge => "maximum age",
			Self::Unhealthy => "unhealthy",
			Self::HostReset => "host reset",
			Self::Shutdown => "shutdown",
			Self::Cancelled => "cancelled",
			Self::Overflow => "overflow",
			Self::Rejected => "rejected by admission hook",
		})
	}
}

/// Age and use limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Retirement {
	pub ttl: Duration,
	pub max_uses: u32,
}

impl Retirement {
	pub fn check(&self, created_at: Instant, use_count: u32, now: Instant) -> Option<RetireReason> {
		if use_count >= self.max_uses {
			return Some(RetireReason::MaxUses);
		}
		if now.saturating_duration_since(created_at) >= self.ttl {
			return Some(RetireReason::MaxAge);
		}
		None
	}
}
