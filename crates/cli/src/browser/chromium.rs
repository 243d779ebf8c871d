//! Chromium engine over the DevTools protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::{ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use pw_protocol::{ConsoleKind, ConsoleLogEntry};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{BLANK_URL, BrowserEngine, BrowserSession, EngineError, EngineResult, LaunchConfig, Viewport};
use crate::console::ConsoleLog;

const SCREEN_PROBE: &str = "({ width: window.screen.width, height: window.screen.height })";
const RESOURCE_COUNT: &str = "performance.getEntriesByType('resource').length";

/// No new resource entries for this long counts as network idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(100);
/// Pages that never stop fetching are treated as settled after this.
const IDLE_CAP: Duration = Duration::from_secs(5);

/// Watches the resource-timing count until it stops growing.
#[derive(Debug)]
struct IdleTracker {
	quiet: Duration,
	count: Option<u64>,
	since: Instant,
}

impl IdleTracker {
	fn new(quiet: Duration, now: Instant) -> Self {
		Self { quiet, count: None, since: now }
	}

	/// Records a sample; `true` once the count has held for the quiet period.
	fn observe(&mut self, count: u64, now: Instant) -> bool {
		if self.count != Some(count) {
			self.count = Some(count);
			self.since = now;
			return false;
		}
		now.duration_since(self.since) >= self.quiet
	}
}

/// Launches a local Chromium through `chromiumoxide`.
#[derive(Debug, Default, Clone)]
pub struct ChromiumEngine;

impl ChromiumEngine {
	pub fn new() -> Self {
		Self
	}
}

fn browser_config(config: &LaunchConfig) -> EngineResult<BrowserConfig> {
	let mut builder = BrowserConfig::builder()
		.no_sandbox()
		.viewport(None::<chromiumoxide::handler::viewport::Viewport>);
	if !config.headless {
		builder = builder.with_head();
	}
	if let Some(executable) = &config.executable {
		builder = builder.chrome_executable(executable);
	}
	if let Some(viewport) = config.viewport {
		builder = builder.window_size(viewport.width, viewport.height);
	}
	for arg in &config.args {
		builder = builder.arg(arg.as_str());
	}
	builder.build().map_err(EngineError::Launch)
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
	async fn launch(&self, config: &LaunchConfig, console: ConsoleLog) -> EngineResult<Arc<dyn BrowserSession>> {
		let (browser, mut handler) = Browser::launch(browser_config(config)?)
			.await
			.map_err(|err| EngineError::Launch(err.to_string()))?;

		let connected = Arc::new(AtomicBool::new(true));
		let handler_task = {
			let connected = Arc::clone(&connected);
			tokio::spawn(async move {
				while let Some(event) = handler.next().await {
					match event {
						Ok(()) => {}
						Err(CdpError::Ws(err)) => {
							debug!(target = "pw.browser", error = %err, "devtools connection closed");
							break;
						}
						Err(err) => trace!(target = "pw.browser", error = %err, "handler error"),
					}
				}
				connected.store(false, Ordering::SeqCst);
				debug!(target = "pw.browser", "devtools handler stopped");
			})
		};

		let mut tasks = vec![handler_task];
		let page = match browser.new_page(BLANK_URL).await {
			Ok(page) => page,
			Err(err) => {
				tasks.iter().for_each(JoinHandle::abort);
				return Err(EngineError::Launch(format!("failed to open page: {err}")));
			}
		};

		match bind_console(&page, console).await {
			Ok(mut listeners) => tasks.append(&mut listeners),
			Err(err) => warn!(target = "pw.browser", error = %err, "console capture unavailable"),
		}

		let mut session = ChromiumSession {
			browser: tokio::sync::Mutex::new(browser),
			page,
			connected,
			screen: None,
			tasks: Mutex::new(tasks),
		};
		session.screen = match session.page.evaluate(SCREEN_PROBE).await.map(|r| r.into_value::<Viewport>()) {
			Ok(Ok(screen)) => Some(screen),
			Ok(Err(err)) => {
				debug!(target = "pw.browser", error = %err, "unexpected screen probe result");
				None
			}
			Err(err) => {
				debug!(target = "pw.browser", error = %err, "screen probe failed");
				None
			}
		};

		Ok(Arc::new(session))
	}
}

/// Subscribes to console calls and uncaught exceptions on `page`.
async fn bind_console(page: &Page, console: ConsoleLog) -> Result<Vec<JoinHandle<()>>, CdpError> {
	let mut calls = page.event_listener::<EventConsoleApiCalled>().await?;
	let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;

	let calls_task = {
		let console = console.clone();
		tokio::spawn(async move {
			while let Some(event) = calls.next().await {
				let entry = console_entry(&event);
				trace!(target = "pw.browser.console", kind = %entry.kind, text = %entry.text);
				console.append(entry);
			}
		})
	};
	let exceptions_task = tokio::spawn(async move {
		while let Some(event) = exceptions.next().await {
			let entry = page_error_entry(&event);
			trace!(target = "pw.browser.console", kind = %entry.kind, text = %entry.text);
			console.append(entry);
		}
	});
	Ok(vec![calls_task, exceptions_task])
}

fn console_kind(kind: &ConsoleApiCalledType) -> ConsoleKind {
	match kind {
		ConsoleApiCalledType::Warning => ConsoleKind::Warn,
		ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleKind::Error,
		ConsoleApiCalledType::Info => ConsoleKind::Info,
		ConsoleApiCalledType::Debug => ConsoleKind::Debug,
		_ => ConsoleKind::Log,
	}
}

fn remote_text(object: &RemoteObject) -> String {
	match (&object.value, &object.description) {
		(Some(Value::String(s)), _) => s.clone(),
		(Some(value), _) => value.to_string(),
		(None, Some(description)) => description.clone(),
		(None, None) => String::new(),
	}
}

fn line(number: i64) -> u32 {
	u32::try_from(number).unwrap_or_default()
}

fn console_entry(event: &EventConsoleApiCalled) -> ConsoleLogEntry {
	let text = event.args.iter().map(remote_text).collect::<Vec<_>>().join(" ");
	let entry = ConsoleLogEntry::new(console_kind(&event.r#type), text);
	match event.stack_trace.as_ref().and_then(|trace| trace.call_frames.first()) {
		Some(frame) => entry.with_location(frame.url.clone(), line(frame.line_number)),
		None => entry,
	}
}

fn page_error_entry(event: &EventExceptionThrown) -> ConsoleLogEntry {
	let details = &event.exception_details;
	let description = details.exception.as_ref().and_then(|e| e.description.clone());
	let text = description
		.as_deref()
		.and_then(|d| d.lines().next())
		.map(str::to_string)
		.unwrap_or_else(|| details.text.clone());

	let mut entry = ConsoleLogEntry::new(ConsoleKind::PageError, text);
	if let Some(url) = &details.url {
		entry = entry.with_location(url.clone(), line(details.line_number));
	}
	match description {
		Some(stack) => entry.with_stack(stack),
		None => entry,
	}
}

/// A launched Chromium with its single page.
pub struct ChromiumSession {
	browser: tokio::sync::Mutex<Browser>,
	page: Page,
	connected: Arc<AtomicBool>,
	screen: Option<Viewport>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ChromiumSession {
	fn classify(&self, err: CdpError) -> EngineError {
		if !self.is_connected() {
			return EngineError::SessionLost(err.to_string());
		}
		match err {
			CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => EngineError::SessionLost(err.to_string()),
			CdpError::JavascriptException(details) => EngineError::Application(exception_message(&details)),
			other => {
				let message = other.to_string();
				if is_target_gone(&message) {
					EngineError::SessionLost(message)
				} else {
					EngineError::Application(message)
				}
			}
		}
	}

	fn abort_tasks(&self) {
		let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
		tasks.iter().for_each(JoinHandle::abort);
	}

	async fn wait_for_network_idle(&self) -> Result<(), CdpError> {
		let started = Instant::now();
		let mut idle = IdleTracker::new(NETWORK_QUIET, started);
		loop {
			let count = self
				.page
				.evaluate(RESOURCE_COUNT)
				.await?
				.into_value::<u64>()
				.unwrap_or_default();
			let now = Instant::now();
			if idle.observe(count, now) {
				return Ok(());
			}
			if now.duration_since(started) >= IDLE_CAP {
				debug!(target = "pw.browser", resources = count, "network still busy, treating page as loaded");
				return Ok(());
			}
			tokio::time::sleep(IDLE_POLL).await;
		}
	}
}

fn exception_message(details: &chromiumoxide::cdp::js_protocol::runtime::ExceptionDetails) -> String {
	details
		.exception
		.as_ref()
		.and_then(|e| e.description.clone())
		.unwrap_or_else(|| details.text.clone())
}

fn is_target_gone(message: &str) -> bool {
	let message = message.to_ascii_lowercase();
	["target closed", "session closed", "no target with given id", "target not found"]
		.iter()
		.any(|needle| message.contains(needle))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	fn screen(&self) -> Option<Viewport> {
		self.screen
	}

	/// Navigates and waits for the load event, then for network idle.
	///
	/// Network idle is approximated by the page's resource-timing entries
	/// holding steady for [`NETWORK_QUIET`], capped at [`IDLE_CAP`].
	async fn goto(&self, url: &str, timeout: Duration) -> EngineResult<()> {
		let navigation = async {
			self.page.goto(url).await?;
			self.page.wait_for_navigation().await?;
			self.wait_for_network_idle().await
		};
		match tokio::time::timeout(timeout, navigation).await {
			Ok(result) => result.map_err(|err| self.classify(err)),
			Err(_) if !self.is_connected() => Err(EngineError::SessionLost(format!("navigation to {url} interrupted"))),
			Err(_) => Err(EngineError::Application(format!(
				"navigation to {url} timed out after {}ms",
				timeout.as_millis()
			))),
		}
	}

	async fn evaluate(&self, code: &str) -> EngineResult<Value> {
		let result = self.page.evaluate(code).await.map_err(|err| self.classify(err))?;
		Ok(result.value().cloned().unwrap_or(Value::Null))
	}

	async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()> {
		let params = SetDeviceMetricsOverrideParams::builder()
			.width(i64::from(viewport.width))
			.height(i64::from(viewport.height))
			.device_scale_factor(0.0)
			.mobile(false)
			.build()
			.map_err(EngineError::Application)?;
		self.page.execute(params).await.map_err(|err| self.classify(err))?;
		Ok(())
	}

	async fn title(&self) -> EngineResult<String> {
		let title = self.page.get_title().await.map_err(|err| self.classify(err))?;
		Ok(title.unwrap_or_default())
	}

	async fn url(&self) -> EngineResult<String> {
		let url = self.page.url().await.map_err(|err| self.classify(err))?;
		Ok(url.unwrap_or_else(|| BLANK_URL.to_string()))
	}

	async fn close(&self) -> EngineResult<()> {
		let mut browser = self.browser.lock().await;
		let closed = browser.close().await;
		if let Err(err) = browser.wait().await {
			debug!(target = "pw.browser", error = %err, "waiting for browser exit failed");
		}
		self.connected.store(false, Ordering::SeqCst);
		self.abort_tasks();
		closed.map(|_| ()).map_err(|err| EngineError::SessionLost(err.to_string()))
	}
}

impl Drop for ChromiumSession {
	fn drop(&mut self) {
		self.abort_tasks();
	}
}
