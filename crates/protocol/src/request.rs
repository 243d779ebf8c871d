//! Requests written by clients into the request slot.
//!
//! A [`Request`] is the loose wire envelope (`{ "action", "data" }`). The
//! daemon turns it into a typed [`Command`] with [`Request::command`], which
//! is where unknown actions and bad payloads are rejected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Action tags accepted on the wire.
pub mod action {
	pub const NAVIGATE: &str = "navigate";
	pub const EXEC: &str = "exec";
	pub const CONSOLE: &str = "console";
	pub const CONSOLE_CLEAR: &str = "console-clear";
	pub const STATUS: &str = "status";
	pub const RESIZE: &str = "resize";
}

/// Request envelope as stored in the request slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
	/// Correlation id echoed back in the response.
	///
	/// Optional on the wire; clients that omit it collect any id-less response.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	/// Action tag, one of [`action`].
	pub action: String,
	/// Action-specific payload. Absent or `null` means empty.
	#[serde(default = "empty_data")]
	pub data: Value,
}

fn empty_data() -> Value {
	Value::Object(Map::new())
}

impl Request {
	/// Builds an id-less request for `command`.
	pub fn new(command: &Command) -> Self {
		Self {
			id: None,
			action: command.name().to_string(),
			data: command.data(),
		}
	}

	/// Attaches a correlation id.
	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	/// Validates the envelope into a typed command.
	pub fn command(&self) -> Result<Command, ProtocolError> {
		let data = &self.data;
		match self.action.as_str() {
			action::NAVIGATE => {
				let url = required_str(data, action::NAVIGATE, "url")?;
				if url.trim().is_empty() {
					return Err(ProtocolError::InvalidField {
						action: action::NAVIGATE,
						field: "url",
						reason: "must not be empty".to_string(),
					});
				}
				Ok(Command::Navigate { url: url.to_string() })
			}
			action::EXEC => {
				let code = required_str(data, action::EXEC, "code")?;
				Ok(Command::Exec { code: code.to_string() })
			}
			action::CONSOLE => Ok(Command::Console),
			action::CONSOLE_CLEAR => Ok(Command::ConsoleClear),
			action::STATUS => Ok(Command::Status),
			action::RESIZE => Ok(Command::Resize {
				width: dimension(data, "width")?,
				height: dimension(data, "height")?,
			}),
			other => Err(ProtocolError::UnknownAction(other.to_string())),
		}
	}
}

/// Validated daemon command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
	/// Navigate the page and wait for it to settle.
	Navigate { url: String },
	/// Evaluate a snippet in page context.
	Exec { code: String },
	/// Snapshot the console log buffer.
	Console,
	/// Empty the console log buffer.
	ConsoleClear,
	/// Report current url, title and buffered log count.
	Status,
	/// Set the page viewport.
	Resize { width: u32, height: u32 },
}

impl Command {
	/// Wire action tag for this command.
	pub fn name(&self) -> &'static str {
		match self {
			Command::Navigate { .. } => action::NAVIGATE,
			Command::Exec { .. } => action::EXEC,
			Command::Console => action::CONSOLE,
			Command::ConsoleClear => action::CONSOLE_CLEAR,
			Command::Status => action::STATUS,
			Command::Resize { .. } => action::RESIZE,
		}
	}

	fn data(&self) -> Value {
		match self {
			Command::Navigate { url } => json!({ "url": url }),
			Command::Exec { code } => json!({ "code": code }),
			Command::Resize { width, height } => json!({ "width": width, "height": height }),
			Command::Console | Command::ConsoleClear | Command::Status => empty_data(),
		}
	}
}

/// Request validation failure. Always answered with an error response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
	#[error("Unknown action: {0}")]
	UnknownAction(String),

	#[error("{action} requires '{field}'")]
	MissingField { action: &'static str, field: &'static str },

	#[error("{action}: invalid '{field}': {reason}")]
	InvalidField {
		action: &'static str,
		field: &'static str,
		reason: String,
	},
}

fn required_str<'a>(data: &'a Value, action: &'static str, field: &'static str) -> Result<&'a str, ProtocolError> {
	match data.get(field) {
		None | Some(Value::Null) => Err(ProtocolError::MissingField { action, field }),
		Some(Value::String(s)) => Ok(s),
		Some(_) => Err(ProtocolError::InvalidField {
			action,
			field,
			reason: "expected a string".to_string(),
		}),
	}
}

/// Parses a positive integer dimension from a number or numeric string.
fn dimension(data: &Value, field: &'static str) -> Result<u32, ProtocolError> {
	let invalid = |reason: &str| ProtocolError::InvalidField {
		action: action::RESIZE,
		field,
		reason: reason.to_string(),
	};

	let raw = match data.get(field) {
		None | Some(Value::Null) => {
			return Err(ProtocolError::MissingField {
				action: action::RESIZE,
				field,
			});
		}
		Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
			(Some(v), _) => v,
			(None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => f as i64,
			_ => return Err(invalid("expected an integer")),
		},
		Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid("expected an integer"))?,
		Some(_) => return Err(invalid("expected an integer")),
	};

	if raw <= 0 {
		return Err(invalid("must be positive"));
	}
	u32::try_from(raw).map_err(|_| invalid("too large"))
}
