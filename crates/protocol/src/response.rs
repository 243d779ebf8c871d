//! Responses written by the daemon into the response slot.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::console::ConsoleLogEntry;

/// Response envelope: `{ "success": true, ...fields }` or `{ "error": "..." }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
	/// Id of the request this answers, when the request carried one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "is_false")]
	pub success: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	/// Action-specific result fields, flattened into the envelope.
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
	!*value
}

impl Response {
	/// Builds a success response whose fields come from `payload`.
	///
	/// `payload` must serialize to a JSON object or unit.
	pub fn success<T: Serialize>(payload: &T) -> serde_json::Result<Self> {
		let fields = match serde_json::to_value(payload)? {
			Value::Object(map) => map,
			Value::Null => Map::new(),
			other => {
				let mut map = Map::new();
				map.insert("result".to_string(), other);
				map
			}
		};
		Ok(Self {
			id: None,
			success: true,
			error: None,
			fields,
		})
	}

	/// Builds an error response carrying `message` verbatim.
	pub fn error(message: impl Into<String>) -> Self {
		Self {
			id: None,
			success: false,
			error: Some(message.into()),
			fields: Map::new(),
		}
	}

	pub fn with_id(mut self, id: Option<String>) -> Self {
		self.id = id;
		self
	}

	/// Returns `true` for responses that carry no error.
	pub fn is_success(&self) -> bool {
		self.error.is_none() && self.success
	}

	/// Returns the result fields, or the error message.
	pub fn into_result(self) -> Result<Map<String, Value>, String> {
		match self.error {
			Some(message) => Err(message),
			None if self.success => Ok(self.fields),
			None => Err("response carried neither success nor error".to_string()),
		}
	}
}

/// Result of `navigate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigateResult {
	pub url: String,
	pub title: String,
}

/// Result of `exec`: the evaluated value, any JSON type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
	pub result: Value,
}

/// Result of `console`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleResult {
	pub logs: Vec<ConsoleLogEntry>,
	/// Entries evicted by a bounded buffer since the last clear.
	#[serde(default, skip_serializing_if = "is_zero")]
	pub dropped: u64,
}

fn is_zero(value: &u64) -> bool {
	*value == 0
}

/// Result of `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResult {
	pub url: String,
	pub title: String,
	pub console_logs_count: usize,
}

/// Result of `resize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeResult {
	pub width: u32,
	pub height: u32,
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn success_flattens_payload_fields() {
		let response = Response::success(&StatusResult {
			url: "https://example.com/".into(),
			title: "Example".into(),
			console_logs_count: 3,
		})
		.unwrap()
		.with_id(Some("req-1".into()));

		assert_eq!(
			serde_json::to_value(&response).unwrap(),
			json!({
				"id": "req-1",
				"success": true,
				"url": "https://example.com/",
				"title": "Example",
				"consoleLogsCount": 3
			})
		);
	}

	#[test]
	fn unit_payload_yields_bare_success() {
		let response = Response::success(&()).unwrap();
		assert_eq!(serde_json::to_value(&response).unwrap(), json!({ "success": true }));
	}

	#[test]
	fn null_exec_result_is_kept() {
		let response = Response::success(&ExecResult { result: Value::Null }).unwrap();
		assert_eq!(
			serde_json::to_value(&response).unwrap(),
			json!({ "success": true, "result": null })
		);
	}

	#[test]
	fn error_response_has_only_error() {
		let response = Response::error("boom");
		assert_eq!(serde_json::to_value(&response).unwrap(), json!({ "error": "boom" }));
		assert_eq!(response.into_result(), Err("boom".to_string()));
	}

	#[test]
	fn parses_foreign_response_fields() {
		let response: Response = serde_json::from_str(r#"{"success":true,"width":800,"height":600}"#).unwrap();
		assert!(response.is_success());
		let fields = response.into_result().unwrap();
		assert_eq!(fields.get("width"), Some(&json!(800)));
	}

	#[test]
	fn console_result_omits_zero_dropped() {
		let value = serde_json::to_value(ConsoleResult {
			logs: Vec::new(),
			dropped: 0,
		})
		.unwrap();
		assert_eq!(value, json!({ "logs": [] }));
	}
}
