//! Browser engine seam.
//!
//! The daemon never talks to a browser directly. It holds a
//! [`BrowserEngine`] that launches sessions and an `Arc<dyn BrowserSession>`
//! for the live page. Every engine call reports failures as an
//! [`EngineError`], already classified as session loss or application error,
//! so callers never inspect error text.
//!
//! [`chromium::ChromiumEngine`] is the production engine;
//! [`crate::testing::MockEngine`] drives the same seam in tests.

pub mod chromium;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::console::ConsoleLog;

/// URL of a freshly opened page; never restored after a restart.
pub const BLANK_URL: &str = "about:blank";

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Classified failure from an engine call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
	/// Transport or page is gone. Recoverable by restarting the session.
	#[error("browser session lost: {0}")]
	SessionLost(String),

	/// The operation itself failed (script threw, navigation failed or timed out).
	#[error("{0}")]
	Application(String),

	/// The engine could not produce a session at all.
	#[error("browser launch failed: {0}")]
	Launch(String),
}

impl EngineError {
	pub fn is_session_lost(&self) -> bool {
		matches!(self, EngineError::SessionLost(_))
	}
}

/// Viewport or screen size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
	pub width: u32,
	pub height: u32,
}

/// Options for launching a browser session.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfig {
	/// Run without a visible window.
	pub headless: bool,
	/// Browser binary to launch instead of the engine's default lookup.
	pub executable: Option<PathBuf>,
	/// Fixed viewport. `None` uses the native window size.
	pub viewport: Option<Viewport>,
	/// Extra command-line arguments passed to the browser.
	pub args: Vec<String>,
}

/// Launches browser sessions.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
	/// Starts a browser, opens a page, and binds console and page-error
	/// listeners that append into `console` for the life of the session.
	async fn launch(&self, config: &LaunchConfig, console: ConsoleLog) -> EngineResult<Arc<dyn BrowserSession>>;
}

/// A live browser with one active page.
#[async_trait]
pub trait BrowserSession: Send + Sync {
	/// Transport-level connectivity. A connected session may still have a closed page.
	fn is_connected(&self) -> bool;

	/// Native screen size captured at startup, when the engine reports one.
	fn screen(&self) -> Option<Viewport>;

	/// Navigates and waits for the page to settle, bounded by `timeout`.
	async fn goto(&self, url: &str, timeout: Duration) -> EngineResult<()>;

	/// Evaluates `code` in page context and returns the JSON value.
	async fn evaluate(&self, code: &str) -> EngineResult<serde_json::Value>;

	async fn set_viewport(&self, viewport: Viewport) -> EngineResult<()>;

	async fn title(&self) -> EngineResult<String>;

	async fn url(&self) -> EngineResult<String>;

	/// Closes the browser. Safe to call on an already dead session.
	async fn close(&self) -> EngineResult<()>;
}
