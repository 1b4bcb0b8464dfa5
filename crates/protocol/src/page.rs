//! `Page`, `Runtime`, and `Emulation` commands used by session hooks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::target::{Command, Empty};

/// `Page.navigate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigate {
	pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
	pub frame_id: String,
	/// Set when the navigation failed (DNS error, aborted, ...).
	#[serde(default)]
	pub error_text: Option<String>,
}

impl Command for Navigate {
	const METHOD: &'static str = "Page.navigate";
	type Response = NavigateResult;
}

/// `Runtime.evaluate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluate {
	pub expression: String,
	pub return_by_value: bool,
	pub await_promise: bool,
}

impl Evaluate {
	pub fn new(expression: impl Into<String>) -> Self {
		Self {
			expression: expression.into(),
			return_by_value: true,
			await_promise: true,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default)]
	pub exception_details: Option<ExceptionDetails>,
}

impl Command for Evaluate {
	const METHOD: &'static str = "Runtime.evaluate";
	type Response = EvaluateResult;
}

/// Mirror of a JavaScript value. With `returnByValue` the value is inlined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub value: Option<Value>,
	#[serde(default)]
	pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	pub text: String,
	#[serde(default)]
	pub line_number: i64,
	#[serde(default)]
	pub column_number: i64,
}

/// `Emulation.setDeviceMetricsOverride`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDeviceMetricsOverride {
	pub width: u32,
	pub height: u32,
	pub device_scale_factor: f64,
	pub mobile: bool,
}

impl Command for SetDeviceMetricsOverride {
	const METHOD: &'static str = "Emulation.setDeviceMetricsOverride";
	type Response = Empty;
}
