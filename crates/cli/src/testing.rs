//! Testing infrastructure for pw-cli.
//!
//! [`MockEngine`] implements the [`BrowserEngine`] seam without spawning a
//! browser. Every launch produces a fresh [`MockBrowser`]; the engine keeps a
//! handle to the latest one so tests can simulate crashes, closed pages and
//! console traffic from the outside.
//!
//! # Example
//!
//! ```ignore
//! use pw_cli::testing::MockEngine;
//!
//! let engine = MockEngine::new();
//! engine.set_title("https://example.com/", "Example");
//! // ... launch a daemon with Arc::new(engine.clone()), then:
//! engine.disconnect();
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pw_protocol::{ConsoleKind, ConsoleLogEntry};
use serde_json::Value;

use crate::browser::{BLANK_URL, BrowserEngine, BrowserSession, EngineError, EngineResult, LaunchConfig, Viewport};
use crate::console::ConsoleLog;

/// Screen size reported by mock sessions launched without a fixed viewport.
pub const MOCK_SCREEN: Viewport = Viewport { width: 1920, height: 1080 };

#[derive(Default)]
struct Shared {
	launches: AtomicUsize,
	fail_launches: AtomicBool,
	unreachable: Mutex<HashSet<String>>,
	titles: Mutex<HashMap<String, String>>,
	eval_results: Mutex<HashMap<String, Value>>,
	current: Mutex<Option<Arc<MockBrowser>>>,
}

/// Mock browser engine. Clones share configuration and launched browsers.
#[derive(Clone, Default)]
pub struct MockEngine {
	shared: Arc<Shared>,
}

impl MockEngine {
	pub fn new() -> Self {
		Self::default()
	}

	/// Number of sessions launched so far.
	pub fn launches(&self) -> usize {
		self.shared.launches.load(Ordering::SeqCst)
	}

	/// Makes subsequent launches fail.
	pub fn fail_launches(&self, fail: bool) {
		self.shared.fail_launches.store(fail, Ordering::SeqCst);
	}

	/// Makes navigation to `url` fail with an application error.
	pub fn set_unreachable(&self, url: &str) {
		lock(&self.shared.unreachable).insert(url.to_string());
	}

	/// Sets the title reported after navigating to `url`.
	pub fn set_title(&self, url: &str, title: &str) {
		lock(&self.shared.titles).insert(url.to_string(), title.to_string());
	}

	/// Sets the value returned when evaluating exactly `code`.
	pub fn set_eval_result(&self, code: &str, result: Value) {
		lock(&self.shared.eval_results).insert(code.to_string(), result);
	}

	/// The most recently launched browser.
	pub fn current(&self) -> Option<Arc<MockBrowser>> {
		lock(&self.shared.current).clone()
	}

	/// Simulates the browser process going away.
	pub fn disconnect(&self) {
		if let Some(browser) = self.current() {
			browser.connected.store(false, Ordering::SeqCst);
		}
	}

	/// Simulates the user closing the tab while the transport stays up.
	pub fn close_page(&self) {
		if let Some(browser) = self.current() {
			browser.page_open.store(false, Ordering::SeqCst);
		}
	}

	/// The next non-probe call on the current browser drops the connection.
	pub fn drop_connection_on_next_call(&self) {
		if let Some(browser) = self.current() {
			browser.drop_on_next_call.store(true, Ordering::SeqCst);
		}
	}

	/// Delivers a console event through the current browser's listeners.
	pub fn emit(&self, entry: ConsoleLogEntry) {
		if let Some(browser) = self.current() {
			browser.console.append(entry);
		}
	}

	pub fn emit_log(&self, text: &str) {
		self.emit(ConsoleLogEntry::new(ConsoleKind::Log, text));
	}
}

#[async_trait]
impl BrowserEngine for MockEngine {
	async fn launch(&self, config: &LaunchConfig, console: ConsoleLog) -> EngineResult<Arc<dyn BrowserSession>> {
		if self.shared.fail_launches.load(Ordering::SeqCst) {
			return Err(EngineError::Launch("mock engine refused to launch".to_string()));
		}
		self.shared.launches.fetch_add(1, Ordering::SeqCst);

		let screen = config.viewport.unwrap_or(MOCK_SCREEN);
		let browser = Arc::new(MockBrowser {
			shared: Arc::clone(&self.shared),
			console,
			connected: AtomicBool::new(true),
			page_open: AtomicBool::new(true),
			drop_on_next_call: AtomicBool::new(false),
			url: Mutex::new(BLANK_URL.to_string()),
			viewport: Mutex::new(screen),
			screen,
			actions: Mutex::new(Vec::new()),
		});
		*lock(&self.shared.current) = Some(Arc::clone(&browser));
		Ok(browser)
	}
}

/// Action recorded by [`MockBrowser`] for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
	Goto { url: String },
	Evaluate { code: String },
	SetViewport { width: u32, height: u32 },
	Close,
}

/// Mock browser session with an in-memory page.
pub struct MockBrowser {
	shared: Arc<Shared>,
	console: ConsoleLog,
	connected: AtomicBool,
	page_open: AtomicBool,
	drop_on_next_call: AtomicBool,
	url: Mutex<String>,
	viewport: Mutex<Viewport>,
	screen: Viewport,
	actions: Mutex<Vec<MockAction>>,
}

impl MockBrowser {
	/// Returns all recorded actions.
	pub fn actions(&self) -> Vec<MockAction> {
		lock(&self.actions).clone()
	}

	/// URLs this browser navigated to successfully.
	pub fn visited(&self) -> Vec<String> {
		self.actions()
			.into_iter()
			.filter_map(|action| match action {
				MockAction::Goto { url } => Some(url),
				_ => None,
			})
			.collect()
	}

	pub fn viewport(&self) -> Viewport {
		*lock(&self.viewport)
	}

	fn record(&self, action: MockAction) {
		lock(&self.actions).push(action);
	}

	/// Fails the way a dead transport or closed page would.
	fn check_alive(&self) -> EngineResult<()> {
		if !self.connected.load(Ordering::SeqCst) {
			return Err(EngineError::SessionLost("browser has been disconnected".to_string()));
		}
		if !self.page_open.load(Ordering::SeqCst) {
			return Err(EngineError::SessionLost("target page has been closed".to_string()));
		}
		Ok(())
	}

	fn check_call(&self) -> EngineResult<()> {
		if self.drop_on_next_call.swap(false, Ordering::SeqCst) {
			self.connected.store(false, Ordering::SeqCst);
		}
		self.check_alive()
	}

	fn current_title(&self) -> String {
		let url = lock(&self.url).clone();
		lock(&self.shared.titles).get(&url).cloned().unwrap_or_default()
	}
}

#[async_trait]
impl BrowserSession for MockBrowser {
	fn is_connected(&self) -> bool {
		self.connected.load(Ordering::SeqCst)
	}

	fn screen(&self) -> Option<Viewport> {
		Some(self.screen)
	}

	async fn goto(&self, url: &str, timeout: Duration) -> EngineResult<()> {
		self.check_call()?;
		if lock(&self.shared.unreachable).contains(url) {
			return Err(EngineError::Application(format!(
				"net::ERR_NAME_NOT_RESOLVED at {url} (timeout {}ms)",
				timeout.as_millis()
			)));
		}
		*lock(&self.url) = url.to_string();
		self.record(MockAction::Goto { url: url.to_string() });
		Ok(())
	}

	async fn evaluate(&self, code: &str) -> EngineResult<Value> {
		self.check_call()?;
		self.record(MockAction::Evaluate { code: code.to_string() });

		if let Some(result) = lock(&self.shared.eval_results).get(code).cloned() {
			return Ok(result);
		}
		let code = code.trim();
		if let Some(thrown) = code.strip_prefix("throw ") {
			return Err(EngineError::Application(format!("Uncaught {}", thrown.trim_end_matches(';'))));
		}
		let value = match code {
			"window.innerWidth" => Value::from(self.viewport().width),
			"window.innerHeight" => Value::from(self.viewport().height),
			"document.title" => Value::from(self.current_title()),
			"location.href" | "window.location.href" => Value::from(lock(&self.url).clone()),
			_ => Value::Null,
		};
		Ok(value)
	}

	async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()> {
		self.check_call()?;
		*lock(&self.viewport) = viewport;
		self.record(MockAction::SetViewport {
			width: viewport.width,
			height: viewport.height,
		});
		Ok(())
	}

	async fn title(&self) -> EngineResult<String> {
		self.check_alive()?;
		Ok(self.current_title())
	}

	async fn url(&self) -> EngineResult<String> {
		self.check_call()?;
		Ok(lock(&self.url).clone())
	}

	async fn close(&self) -> EngineResult<()> {
		self.record(MockAction::Close);
		let was_connected = self.connected.swap(false, Ordering::SeqCst);
		if was_connected {
			Ok(())
		} else {
			Err(EngineError::SessionLost("browser already closed".to_string()))
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}
