//! Session ownership and lazy restart.
//!
//! [`SessionManager`] holds the single live browser session. It answers
//! whether the session is usable and, when it is not, replaces it with a
//! fresh one and brings the page back to the last successful navigation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::browser::{BLANK_URL, BrowserEngine, BrowserSession, EngineError, EngineResult, LaunchConfig};
use crate::console::ConsoleLog;
use crate::error::{PwError, Result};

/// Upper bound on closing a session that is being discarded.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Owner of the daemon's browser session.
pub struct SessionManager {
	engine: Arc<dyn BrowserEngine>,
	launch: LaunchConfig,
	console: ConsoleLog,
	restore_timeout: Duration,
	session: Mutex<Option<Arc<dyn BrowserSession>>>,
	last_url: Mutex<Option<String>>,
	/// Serializes restarts; waiters observe the finished restart instead of starting another.
	restart_lock: tokio::sync::Mutex<()>,
	restarts: AtomicU64,
}

impl SessionManager {
	pub fn new(engine: Arc<dyn BrowserEngine>, launch: LaunchConfig, console: ConsoleLog, restore_timeout: Duration) -> Self {
		Self {
			engine,
			launch,
			console,
			restore_timeout,
			session: Mutex::new(None),
			last_url: Mutex::new(None),
			restart_lock: tokio::sync::Mutex::new(()),
			restarts: AtomicU64::new(0),
		}
	}

	/// Launches the first session.
	///
	/// # Errors
	///
	/// Returns [`PwError::FatalStartup`] when the engine cannot launch.
	pub async fn start(&self) -> Result<()> {
		let _guard = self.restart_lock.lock().await;
		let session = self.launch_session().await?;
		*lock(&self.session) = Some(session);
		Ok(())
	}

	/// Two-tier usability check: transport connected, then a title round-trip.
	pub async fn is_usable(&self) -> bool {
		let Some(session) = lock(&self.session).clone() else {
			return false;
		};
		if !session.is_connected() {
			debug!(target = "pw.session", "transport disconnected");
			return false;
		}
		match session.title().await {
			Ok(_) => true,
			Err(err) => {
				debug!(target = "pw.session", error = %err, "session probe failed");
				false
			}
		}
	}

	/// Restarts the session if it is not usable. Returns whether a restart ran.
	pub async fn ensure_usable(&self) -> Result<bool> {
		if self.is_usable().await {
			return Ok(false);
		}
		let _guard = self.restart_lock.lock().await;
		if self.is_usable().await {
			return Ok(false);
		}
		info!(target = "pw.session", "session unusable, restarting");
		self.restart_locked().await?;
		Ok(true)
	}

	/// Replaces the session unconditionally.
	///
	/// A caller that waited on an in-flight restart reuses its result when the
	/// new session is usable.
	pub async fn restart(&self) -> Result<()> {
		let seen = self.restarts.load(Ordering::SeqCst);
		let _guard = self.restart_lock.lock().await;
		if self.restarts.load(Ordering::SeqCst) != seen && self.is_usable().await {
			debug!(target = "pw.session", "restart already completed by another caller");
			return Ok(());
		}
		self.restart_locked().await
	}

	/// The live session, or `SessionLost` when there is none.
	pub fn current(&self) -> EngineResult<Arc<dyn BrowserSession>> {
		lock(&self.session)
			.clone()
			.ok_or_else(|| EngineError::SessionLost("no active browser session".to_string()))
	}

	/// Most recent successfully navigated URL.
	pub fn last_url(&self) -> Option<String> {
		lock(&self.last_url).clone()
	}

	/// Records a navigation that completed. Failed navigations must not call this.
	pub fn record_navigation(&self, url: impl Into<String>) {
		*lock(&self.last_url) = Some(url.into());
	}

	/// Number of completed restarts since the daemon started.
	pub fn restarts(&self) -> u64 {
		self.restarts.load(Ordering::SeqCst)
	}

	pub fn console(&self) -> &ConsoleLog {
		&self.console
	}

	/// Closes the session for good.
	pub async fn shutdown(&self) {
		let _guard = self.restart_lock.lock().await;
		let old = lock(&self.session).take();
		if let Some(session) = old {
			teardown(session).await;
		}
	}

	/// Caller must hold `restart_lock`.
	async fn restart_locked(&self) -> Result<()> {
		let old = lock(&self.session).take();
		if let Some(session) = old {
			teardown(session).await;
		}

		let session = self.launch_session().await?;
		*lock(&self.session) = Some(Arc::clone(&session));

		if let Some(url) = self.last_url().filter(|url| url != BLANK_URL) {
			match session.goto(&url, self.restore_timeout).await {
				Ok(()) => info!(target = "pw.session", url = %url, "restored last page"),
				Err(err) => warn!(target = "pw.session", url = %url, error = %err, "failed to restore last page"),
			}
		}

		let count = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
		info!(target = "pw.session", restarts = count, "session restarted");
		Ok(())
	}

	async fn launch_session(&self) -> Result<Arc<dyn BrowserSession>> {
		debug!(
			target = "pw.session",
			headless = self.launch.headless,
			executable = ?self.launch.executable,
			"launching browser"
		);
		let session = self
			.engine
			.launch(&self.launch, self.console.clone())
			.await
			.map_err(|err| PwError::FatalStartup(err.to_string()))?;

		match session.screen() {
			Some(screen) => info!(target = "pw.session", width = screen.width, height = screen.height, "browser session started"),
			None => info!(target = "pw.session", "browser session started"),
		}
		Ok(session)
	}
}

async fn teardown(session: Arc<dyn BrowserSession>) {
	match tokio::time::timeout(TEARDOWN_TIMEOUT, session.close()).await {
		Ok(Ok(())) => debug!(target = "pw.session", "old session closed"),
		Ok(Err(err)) => debug!(target = "pw.session", error = %err, "ignoring teardown error"),
		Err(_) => debug!(target = "pw.session", "teardown timed out"),
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}
