//! Wire types for the Chrome DevTools Protocol.
//!
//! This crate contains the serde-serializable types exchanged with a browser
//! over its DevTools websocket. Only the domains the session pool needs are
//! modelled: target and browser-context management, a few page/runtime calls
//! used by hooks, and the `/json/version` discovery document.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with protocol: field names follow the CDP JSON schema (camelCase)
//! * Stable: Changes only when the wire protocol changes
//!
//! Correlation, transport, and lifecycle live in `tabpool-runtime`.

pub mod discovery;
pub mod message;
pub mod page;
pub mod target;

pub use discovery::*;
pub use message::*;
pub use page::*;
pub use target::*;
