use serde_json::json;

use super::*;

fn fields(value: Value) -> Map<String, Value> {
	match value {
		Value::Object(map) => map,
		_ => panic!("expected object"),
	}
}

#[test]
fn result_builder_success() {
	let result = ResultBuilder::new("navigate")
		.data(fields(json!({ "url": "https://example.com/", "title": "Example" })))
		.build();

	assert!(result.ok);
	assert_eq!(result.command, "navigate");
	assert!(result.data.is_some());
	assert!(result.error.is_none());
	assert!(result.timings.is_some());
}

#[test]
fn result_builder_error() {
	let result = ResultBuilder::new("exec")
		.error(CommandError {
			code: ErrorCode::CommandFailed,
			message: "ReferenceError: nope is not defined".into(),
			details: None,
		})
		.build();

	assert!(!result.ok);
	assert!(result.data.is_none());
	assert_eq!(result.error.as_ref().map(|e| e.code), Some(ErrorCode::CommandFailed));
}

#[test]
fn error_code_display_matches_serde() {
	for code in [ErrorCode::DaemonNotRunning, ErrorCode::Timeout, ErrorCode::CommandFailed] {
		let serialized = serde_json::to_value(code).unwrap();
		assert_eq!(serialized, json!(code.to_string()));
	}
}

#[test]
fn output_format_parse() {
	assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
	assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
	assert!("toon".parse::<OutputFormat>().is_err());
}

#[test]
fn text_renders_console_lines_with_location() {
	let result = ResultBuilder::new("console")
		.data(fields(json!({
			"logs": [
				{ "type": "log", "text": "hello" },
				{ "type": "pageerror", "text": "boom", "location": { "url": "app.js", "lineNumber": 4 } }
			],
			"dropped": 3
		})))
		.build();

	assert_eq!(
		render_text(&result),
		"[log] hello\n[pageerror] boom (app.js:4)\n(3 older entries dropped)\n"
	);
}

#[test]
fn text_renders_exec_strings_raw() {
	let result = ResultBuilder::new("exec").data(fields(json!({ "result": "plain" }))).build();
	assert_eq!(render_text(&result), "plain\n");

	let result = ResultBuilder::new("exec").data(fields(json!({ "result": 42 }))).build();
	assert_eq!(render_text(&result), "42\n");
}

#[test]
fn text_renders_status_fields() {
	let result = ResultBuilder::new("status")
		.data(fields(json!({ "url": "https://example.com/", "consoleLogsCount": 2 })))
		.build();
	let text = render_text(&result);
	assert!(text.contains("url: https://example.com/\n"));
	assert!(text.contains("consoleLogsCount: 2\n"));
}
