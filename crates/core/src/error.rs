//! Pool error type.

use std::any::Any;

use thiserror::Error;

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised by the pool, its host connection, or session hooks.
///
/// Caller errors returned from [`SessionPool::with_session`](crate::SessionPool::with_session)
/// never pass through this type; they are handed back unchanged.
#[derive(Debug, Error)]
pub enum PoolError {
	/// The pool has been shut down.
	#[error("session pool is shut down")]
	Closed,

	/// The host is not connected.
	#[error("host is not connected")]
	NotConnected,

	/// A host operation failed.
	#[error("host error: {0}")]
	Host(String),

	/// Reconnection gave up after the configured number of attempts.
	#[error("gave up connecting after {attempts} attempts: {last_error}")]
	ConnectExhausted { attempts: u32, last_error: String },

	/// A session hook failed.
	#[error("session hook failed: {0}")]
	Hook(String),

	/// Pool parameters are inconsistent.
	#[error("invalid pool configuration: {0}")]
	InvalidConfig(String),

	#[error(transparent)]
	Runtime(#[from] tabpool_runtime::Error),
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		message
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message
	} else {
		"non-string panic payload"
	}
}
