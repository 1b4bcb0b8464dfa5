//! `Target` and `Browser` domain types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed CDP command: its parameters plus the shape of its result.
pub trait Command: Serialize {
	/// Fully qualified method name.
	const METHOD: &'static str;
	/// Result payload.
	type Response: DeserializeOwned;
}

/// Result type for commands whose response carries no fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

/// `Target.createBrowserContext`: an isolated, incognito-like context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContext {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub dispose_on_detach: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBrowserContextResult {
	pub browser_context_id: String,
}

impl Command for CreateBrowserContext {
	const METHOD: &'static str = "Target.createBrowserContext";
	type Response = CreateBrowserContextResult;
}

/// `Target.disposeBrowserContext`: closes every page that belongs to the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposeBrowserContext {
	pub browser_context_id: String,
}

impl Command for DisposeBrowserContext {
	const METHOD: &'static str = "Target.disposeBrowserContext";
	type Response = Empty;
}

/// `Target.createTarget`: opens a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTarget {
	pub url: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub width: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub height: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub browser_context_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResult {
	pub target_id: String,
}

impl Command for CreateTarget {
	const METHOD: &'static str = "Target.createTarget";
	type Response = CreateTargetResult;
}

/// `Target.attachToTarget`. With `flatten` set, commands for the page are sent
/// over the browser connection tagged with the returned `sessionId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTarget {
	pub target_id: String,
	pub flatten: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
	pub session_id: String,
}

impl Command for AttachToTarget {
	const METHOD: &'static str = "Target.attachToTarget";
	type Response = AttachToTargetResult;
}

/// `Target.closeTarget`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTarget {
	pub target_id: String,
}

impl Command for CloseTarget {
	const METHOD: &'static str = "Target.closeTarget";
	type Response = Empty;
}

/// `Target.setDiscoverTargets`: subscribes to `Target.targetDestroyed` and friends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDiscoverTargets {
	pub discover: bool,
}

impl Command for SetDiscoverTargets {
	const METHOD: &'static str = "Target.setDiscoverTargets";
	type Response = Empty;
}

/// `Browser.getVersion`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetVersion {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVersionResult {
	pub protocol_version: String,
	pub product: String,
	#[serde(default)]
	pub user_agent: String,
}

impl Command for GetVersion {
	const METHOD: &'static str = "Browser.getVersion";
	type Response = GetVersionResult;
}

/// `Target.targetDestroyed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDestroyed {
	pub target_id: String,
}

impl TargetDestroyed {
	pub const EVENT: &'static str = "Target.targetDestroyed";
}

/// `Target.detachedFromTarget` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
	pub session_id: String,
	#[serde(default)]
	pub target_id: Option<String>,
}

impl DetachedFromTarget {
	pub const EVENT: &'static str = "Target.detachedFromTarget";
}

/// `Inspector.detached` event, emitted on a page session when it goes away.
pub const INSPECTOR_DETACHED: &str = "Inspector.detached";
