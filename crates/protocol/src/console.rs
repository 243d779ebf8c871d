//! Console events captured from the page.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of captured console event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleKind {
	Log,
	Info,
	Warn,
	Error,
	Debug,
	/// Uncaught exception on the page.
	#[serde(rename = "pageerror")]
	PageError,
}

impl fmt::Display for ConsoleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ConsoleKind::Log => "log",
			ConsoleKind::Info => "info",
			ConsoleKind::Warn => "warn",
			ConsoleKind::Error => "error",
			ConsoleKind::Debug => "debug",
			ConsoleKind::PageError => "pageerror",
		};
		f.write_str(name)
	}
}

/// Source position of a console event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleLocation {
	pub url: String,
	pub line_number: u32,
}

/// One buffered console event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLogEntry {
	#[serde(rename = "type")]
	pub kind: ConsoleKind,
	pub text: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub location: Option<ConsoleLocation>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

impl ConsoleLogEntry {
	pub fn new(kind: ConsoleKind, text: impl Into<String>) -> Self {
		Self {
			kind,
			text: text.into(),
			location: None,
			stack: None,
		}
	}

	pub fn with_location(mut self, url: impl Into<String>, line_number: u32) -> Self {
		self.location = Some(ConsoleLocation {
			url: url.into(),
			line_number,
		});
		self
	}

	pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
		self.stack = Some(stack.into());
		self
	}
}
