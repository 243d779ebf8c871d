//! Structured output envelope for client commands.
//!
//! Every client command prints one result envelope on stdout:
//!
//! ```json
//! {
//!   "ok": true,
//!   "command": "status",
//!   "data": { "url": "https://example.com/", "title": "Example", "consoleLogsCount": 2 },
//!   "timings": { "durationMs": 112 }
//! }
//! ```
//!
//! Failures print `Error [CODE]: message` on stderr and, for machine formats,
//! an `ok: false` envelope on stdout.

#[cfg(test)]
mod tests;

use std::io::{self, Write};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format for CLI results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// JSON output (default)
	#[default]
	Json,
	/// Human-readable text
	Text,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"json" => Ok(OutputFormat::Json),
			"text" => Ok(OutputFormat::Text),
			_ => Err(format!("unknown format: {s}")),
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Text => write!(f, "text"),
		}
	}
}

/// The result envelope printed by client commands.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
	pub ok: bool,

	/// Command name (e.g., "navigate", "exec", "status")
	pub command: String,

	/// Response fields from the daemon (only present on success)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<Map<String, Value>>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<CommandError>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub timings: Option<Timings>,
}

/// Error information for failed commands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
	pub code: ErrorCode,

	/// Human-readable error message
	pub message: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Standardized error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
	/// No live daemon behind the ready marker
	DaemonNotRunning,
	/// Another request occupies the request slot
	RequestPending,
	/// No response within the client timeout
	Timeout,
	/// The daemon answered with an error response
	CommandFailed,
	/// Browser failed to launch
	BrowserLaunchFailed,
	/// Session/connection error
	SessionError,
	/// Invalid input provided
	InvalidInput,
	/// File I/O error
	IoError,
	/// Unknown/internal error
	InternalError,
}

impl std::fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			ErrorCode::DaemonNotRunning => write!(f, "DAEMON_NOT_RUNNING"),
			ErrorCode::RequestPending => write!(f, "REQUEST_PENDING"),
			ErrorCode::Timeout => write!(f, "TIMEOUT"),
			ErrorCode::CommandFailed => write!(f, "COMMAND_FAILED"),
			ErrorCode::BrowserLaunchFailed => write!(f, "BROWSER_LAUNCH_FAILED"),
			ErrorCode::SessionError => write!(f, "SESSION_ERROR"),
			ErrorCode::InvalidInput => write!(f, "INVALID_INPUT"),
			ErrorCode::IoError => write!(f, "IO_ERROR"),
			ErrorCode::InternalError => write!(f, "INTERNAL_ERROR"),
		}
	}
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timings {
	pub duration_ms: u64,
}

/// Builder for [`CommandResult`], measuring duration from construction.
pub struct ResultBuilder {
	command: String,
	started: Instant,
	data: Option<Map<String, Value>>,
	error: Option<CommandError>,
}

impl ResultBuilder {
	pub fn new(command: impl Into<String>) -> Self {
		Self {
			command: command.into(),
			started: Instant::now(),
			data: None,
			error: None,
		}
	}

	pub fn data(mut self, data: Map<String, Value>) -> Self {
		self.data = Some(data);
		self
	}

	pub fn error(mut self, error: CommandError) -> Self {
		self.error = Some(error);
		self
	}

	pub fn build(self) -> CommandResult {
		CommandResult {
			ok: self.error.is_none(),
			command: self.command,
			data: self.data,
			error: self.error,
			timings: Some(Timings {
				duration_ms: self.started.elapsed().as_millis() as u64,
			}),
		}
	}
}

/// Print a command result to stdout in the requested format
pub fn print_result(result: &CommandResult, format: OutputFormat) {
	let stdout = io::stdout();
	let mut out = stdout.lock();
	match format {
		OutputFormat::Json => {
			if let Ok(json) = serde_json::to_string_pretty(result) {
				let _ = writeln!(out, "{json}");
			}
		}
		OutputFormat::Text => {
			let _ = write!(out, "{}", render_text(result));
		}
	}
}

/// Renders a successful result for humans. Errors go to stderr instead.
pub fn render_text(result: &CommandResult) -> String {
	let mut text = String::new();
	let Some(data) = &result.data else {
		return text;
	};

	match result.command.as_str() {
		"console" => {
			let logs = data.get("logs").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
			for log in logs {
				text.push_str(&render_console_line(log));
				text.push('\n');
			}
			if let Some(dropped) = data.get("dropped").and_then(Value::as_u64) {
				text.push_str(&format!("({dropped} older entries dropped)\n"));
			}
		}
		"exec" => {
			let value = data.get("result").cloned().unwrap_or(Value::Null);
			match value {
				Value::String(s) => text.push_str(&s),
				other => text.push_str(&serde_json::to_string_pretty(&other).unwrap_or_default()),
			}
			text.push('\n');
		}
		"console-clear" => text.push_str("Console cleared\n"),
		_ => {
			for (key, value) in data {
				match value {
					Value::String(s) => text.push_str(&format!("{key}: {s}\n")),
					other => text.push_str(&format!("{key}: {other}\n")),
				}
			}
		}
	}
	text
}

fn render_console_line(log: &Value) -> String {
	let kind = log.get("type").and_then(Value::as_str).unwrap_or("log");
	let body = log.get("text").and_then(Value::as_str).unwrap_or_default();
	let location = log.get("location").and_then(|loc| {
		let url = loc.get("url")?.as_str()?;
		let line = loc.get("lineNumber")?.as_u64()?;
		Some(format!(" ({url}:{line})"))
	});
	format!("[{kind}] {body}{}", location.unwrap_or_default())
}

/// Print an error to stderr in human-readable format
pub fn print_error_stderr(error: &CommandError) {
	eprintln!("Error [{}]: {}", error.code, error.message);
}
