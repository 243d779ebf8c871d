//! The long-lived daemon: owns the browser session and serves the channel.
//!
//! The loop is strictly sequential. Each tick consumes at most one request
//! and finishes dispatching it before the next tick is polled, so the
//! dispatcher is never re-entered.

use std::future::Future;
use std::sync::Arc;

use pw_protocol::Response;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::browser::BrowserEngine;
use crate::channel::{CommandChannel, Incoming};
use crate::config::DaemonConfig;
use crate::console::ConsoleLog;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::session::SessionManager;

pub struct Daemon {
	config: DaemonConfig,
	channel: CommandChannel,
	sessions: Arc<SessionManager>,
	dispatcher: Dispatcher,
}

impl Daemon {
	pub fn new(config: DaemonConfig, engine: Arc<dyn BrowserEngine>) -> Self {
		let console = ConsoleLog::with_limit(config.console_limit);
		let sessions = Arc::new(SessionManager::new(
			engine,
			config.launch.clone(),
			console,
			config.restore_timeout,
		));
		let dispatcher = Dispatcher::new(Arc::clone(&sessions), config.navigation_timeout);
		Self {
			channel: CommandChannel::new(config.dir.clone()),
			config,
			sessions,
			dispatcher,
		}
	}

	pub fn channel(&self) -> &CommandChannel {
		&self.channel
	}

	pub fn sessions(&self) -> &Arc<SessionManager> {
		&self.sessions
	}

	/// Clears leftovers from a previous run, launches the browser and
	/// publishes the ready marker.
	///
	/// # Errors
	///
	/// [`crate::error::PwError::FatalStartup`] when the browser does not start.
	pub async fn start(&self) -> Result<()> {
		self.channel.clear_artifacts()?;
		self.sessions.start().await?;
		let pid = std::process::id();
		self.channel.mark_ready(pid)?;
		info!(
			target = "pw.daemon",
			dir = %self.config.dir.display(),
			pid,
			poll_ms = self.config.poll_interval.as_millis() as u64,
			"daemon ready"
		);
		Ok(())
	}

	/// Handles at most one pending request. Returns whether one was handled.
	///
	/// Only a fatal browser startup failure is returned as an error. Channel
	/// read and write failures are logged and the daemon keeps serving.
	pub async fn poll_once(&self) -> Result<bool> {
		let incoming = match self.channel.try_consume_request() {
			Ok(Some(incoming)) => incoming,
			Ok(None) => return Ok(false),
			Err(err) => {
				warn!(target = "pw.daemon", error = %err, "failed to read request slot");
				return Ok(false);
			}
		};

		let response = match incoming {
			Incoming::Request(request) => {
				debug!(target = "pw.daemon", action = %request.action, id = ?request.id, "request received");
				self.dispatcher.dispatch(request).await?
			}
			Incoming::Malformed { id, reason } => Response::error(format!("Invalid request: {reason}")).with_id(id),
		};

		if let Err(err) = self.channel.write_response(&response) {
			warn!(target = "pw.daemon", error = %err, "failed to write response");
		}
		Ok(true)
	}

	/// Serves requests until `shutdown` resolves or startup fails.
	pub async fn run_until<F>(self, shutdown: F) -> Result<()>
	where
		F: Future<Output = ()>,
	{
		if let Err(err) = self.start().await {
			error!(target = "pw.daemon", error = %err, "daemon startup failed");
			self.cleanup().await;
			return Err(err);
		}

		let mut ticker = tokio::time::interval(self.config.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		tokio::pin!(shutdown);

		let outcome = loop {
			tokio::select! {
				_ = &mut shutdown => {
					info!(target = "pw.daemon", "shutdown requested");
					break Ok(());
				}
				_ = ticker.tick() => {
					if let Err(err) = self.poll_once().await {
						error!(target = "pw.daemon", error = %err, "fatal error, stopping daemon");
						break Err(err);
					}
				}
			}
		};

		self.cleanup().await;
		info!(target = "pw.daemon", restarts = self.sessions.restarts(), "daemon stopped");
		outcome
	}

	/// Serves requests until SIGINT or SIGTERM.
	pub async fn run(self) -> Result<()> {
		self.run_until(shutdown_signal()).await
	}

	async fn cleanup(&self) {
		self.sessions.shutdown().await;
		if let Err(err) = self.channel.clear_artifacts() {
			warn!(target = "pw.daemon", error = %err, "failed to clear channel files");
		}
	}
}

#[cfg(unix)]
async fn shutdown_signal() {
	use tokio::signal::unix::{SignalKind, signal};

	let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
		(Ok(term), Ok(int)) => (term, int),
		(Err(err), _) | (_, Err(err)) => {
			warn!(target = "pw.daemon", error = %err, "failed to install signal handlers, falling back to ctrl-c");
			let _ = tokio::signal::ctrl_c().await;
			return;
		}
	};

	tokio::select! {
		_ = sigterm.recv() => info!(target = "pw.daemon", "received SIGTERM"),
		_ = sigint.recv() => info!(target = "pw.daemon", "received SIGINT"),
	}
}

#[cfg(not(unix))]
async fn shutdown_signal() {
	if tokio::signal::ctrl_c().await.is_ok() {
		info!(target = "pw.daemon", "received Ctrl+C");
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_protocol::{Command, Request};
	use tempfile::TempDir;

	use super::*;
	use crate::error::PwError;
	use crate::testing::{MockAction, MockEngine};

	fn daemon(tmp: &TempDir, engine: &MockEngine) -> Daemon {
		let mut config = DaemonConfig::new(tmp.path());
		config.poll_interval = Duration::from_millis(10);
		Daemon::new(config, Arc::new(engine.clone()))
	}

	#[tokio::test]
	async fn start_clears_stale_files_and_marks_ready() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		let daemon = daemon(&tmp, &engine);
		std::fs::write(daemon.channel().request_path(), b"{\"action\":\"status\"}").unwrap();
		std::fs::write(daemon.channel().response_path(), b"{}").unwrap();

		daemon.start().await.unwrap();
		assert!(!daemon.channel().request_path().exists());
		assert!(!daemon.channel().response_path().exists());
		assert_eq!(daemon.channel().ready_pid(), Some(std::process::id()));
	}

	#[tokio::test]
	async fn poll_once_answers_one_request() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		let daemon = daemon(&tmp, &engine);
		daemon.start().await.unwrap();

		assert!(!daemon.poll_once().await.unwrap());
		let request = Request::new(&Command::Status).with_id("s1");
		daemon.channel().try_send_request(&request).unwrap();

		assert!(daemon.poll_once().await.unwrap());
		let response = daemon.channel().try_read_response(Some("s1")).unwrap().unwrap();
		assert!(response.is_success());
		assert!(!daemon.channel().request_path().exists());
	}

	#[tokio::test]
	async fn malformed_request_gets_error_response() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		let daemon = daemon(&tmp, &engine);
		daemon.start().await.unwrap();
		std::fs::write(daemon.channel().request_path(), b"not json at all").unwrap();

		assert!(daemon.poll_once().await.unwrap());
		let response = daemon.channel().try_read_response(None).unwrap().unwrap();
		assert!(response.error.unwrap().starts_with("Invalid request:"));
		assert!(!daemon.channel().request_path().exists());
	}

	#[tokio::test]
	async fn malformed_request_with_id_is_answered_to_its_sender() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		let daemon = daemon(&tmp, &engine);
		daemon.start().await.unwrap();
		std::fs::write(daemon.channel().request_path(), br#"{"id":"c-1","action":5}"#).unwrap();

		assert!(daemon.poll_once().await.unwrap());
		assert_eq!(daemon.channel().try_read_response(None).unwrap(), None);
		let response = daemon.channel().try_read_response(Some("c-1")).unwrap().unwrap();
		assert_eq!(response.id.as_deref(), Some("c-1"));
		assert!(response.error.unwrap().starts_with("Invalid request:"));
	}

	#[tokio::test]
	async fn startup_failure_leaves_no_ready_marker() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		engine.fail_launches(true);
		let daemon = daemon(&tmp, &engine);

		let err = daemon.run_until(std::future::pending()).await.unwrap_err();
		assert!(matches!(err, PwError::FatalStartup(_)));
		assert!(!tmp.path().join(crate::channel::READY_FILE).exists());
	}

	#[tokio::test]
	async fn shutdown_closes_session_and_clears_marker() {
		let tmp = TempDir::new().unwrap();
		let engine = MockEngine::new();
		let daemon = daemon(&tmp, &engine);

		daemon.run_until(tokio::time::sleep(Duration::from_millis(50))).await.unwrap();
		assert!(!tmp.path().join(crate::channel::READY_FILE).exists());
		assert!(engine.current().unwrap().actions().contains(&MockAction::Close));
	}
}
