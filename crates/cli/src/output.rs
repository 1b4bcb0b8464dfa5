//! JSON result envelope printed by commands.

use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult<T: Serialize> {
	pub ok: bool,
	pub command: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	pub duration_ms: u64,
}

/// Builder for [`CommandResult`]; the clock starts at [`new`](Self::new).
pub struct ResultBuilder<T: Serialize> {
	command: String,
	data: Option<T>,
	error: Option<String>,
	started: Instant,
}

impl<T: Serialize> ResultBuilder<T> {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			data: None,
			error: None,
			started: Instant::now(),
		}
	}

	pub fn data(mut self, data: T) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, message: impl Into<String>) -> Self {
		self.error = Some(message.into());
		self
	}

	pub fn build(self) -> CommandResult<T> {
		CommandResult {
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			duration_ms: self.started.elapsed().as_millis() as u64,
		}
	}
}

pub fn print_result<T: Serialize>(result: &CommandResult<T>) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(result)?);
	Ok(())
}
