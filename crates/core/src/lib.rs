//! A bounded pool of remote browser sessions.
//!
//! [`SessionPool`] keeps between `min_size` and `max_size` sessions open on a
//! [`Host`], hands them out one caller at a time through
//! [`SessionPool::with_session`], retires them by age and use count, and
//! rebuilds everything when the host connection drops. [`cdp::CdpHost`] is
//! the host for Chrome DevTools Protocol browsers.

pub mod backoff;
pub mod cdp;
pub mod config;
pub mod error;
mod facade;
pub mod host;
pub mod phase;
mod pool;
mod reconciler;
pub mod session;

pub use backoff::BackoffConfig;
pub use cdp::{CdpHost, CdpHostOptions, CdpSession, Viewport};
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use facade::{PoolStatus, SessionPool};
pub use futures_util::future::BoxFuture;
pub use host::{Host, NoHooks, SessionHooks};
pub use phase::PoolPhase;
pub use session::{RetireReason, SessionHandle, SessionId};
