//! Request dispatch.
//!
//! Each request runs `validate -> ensure usable -> execute`, with a single
//! restart-and-retry when execution reports session loss. Every outcome
//! becomes exactly one [`Response`]; only a failed browser launch escapes, as
//! [`PwError::FatalStartup`].

use std::sync::Arc;
use std::time::Duration;

use pw_protocol::{Command, ConsoleResult, ExecResult, NavigateResult, Request, ResizeResult, Response, StatusResult};
use tracing::{debug, info, warn};

use crate::browser::{EngineError, EngineResult, Viewport};
use crate::error::{PwError, Result};
use crate::session::SessionManager;

pub struct Dispatcher {
	sessions: Arc<SessionManager>,
	navigation_timeout: Duration,
}

impl Dispatcher {
	pub fn new(sessions: Arc<SessionManager>, navigation_timeout: Duration) -> Self {
		Self {
			sessions,
			navigation_timeout,
		}
	}

	/// Runs `request` to completion and builds its response.
	///
	/// # Errors
	///
	/// Only [`PwError::FatalStartup`], when a needed restart cannot launch a browser.
	pub async fn dispatch(&self, request: Request) -> Result<Response> {
		let id = request.id.clone();
		let command = match request.command() {
			Ok(command) => command,
			Err(err) => {
				warn!(target = "pw.dispatch", action = %request.action, error = %err, "rejected request");
				return Ok(Response::error(err.to_string()).with_id(id));
			}
		};

		debug!(target = "pw.dispatch", action = command.name(), id = ?id, "dispatching");
		let response = match self.run(&command).await {
			Ok(response) => response,
			Err(PwError::Engine(err)) => {
				debug!(target = "pw.dispatch", action = command.name(), error = %err, "command failed");
				Response::error(err.to_string())
			}
			Err(err) => return Err(err),
		};
		Ok(response.with_id(id))
	}

	async fn run(&self, command: &Command) -> Result<Response> {
		self.sessions.ensure_usable().await?;

		match self.execute(command).await {
			Err(err) if err.is_session_lost() => {
				info!(target = "pw.dispatch", action = command.name(), error = %err, "session lost, restarting and retrying once");
				self.sessions.restart().await?;
				Ok(self.execute(command).await?)
			}
			other => Ok(other?),
		}
	}

	async fn execute(&self, command: &Command) -> EngineResult<Response> {
		match command {
			Command::Navigate { url } => {
				let session = self.sessions.current()?;
				session.goto(url, self.navigation_timeout).await?;
				let url = session.url().await?;
				let title = session.title().await?;
				self.sessions.record_navigation(url.clone());
				respond(&NavigateResult { url, title })
			}
			Command::Exec { code } => {
				let result = self.sessions.current()?.evaluate(code).await?;
				respond(&ExecResult { result })
			}
			Command::Console => {
				let console = self.sessions.console();
				respond(&ConsoleResult {
					logs: console.snapshot(),
					dropped: console.dropped(),
				})
			}
			Command::ConsoleClear => {
				self.sessions.console().clear();
				respond(&())
			}
			Command::Status => {
				let session = self.sessions.current()?;
				respond(&StatusResult {
					url: session.url().await?,
					title: session.title().await?,
					console_logs_count: self.sessions.console().len(),
				})
			}
			Command::Resize { width, height } => {
				let viewport = Viewport {
					width: *width,
					height: *height,
				};
				self.sessions.current()?.set_viewport(viewport).await?;
				respond(&ResizeResult {
					width: *width,
					height: *height,
				})
			}
		}
	}
}

fn respond<T: serde::Serialize>(payload: &T) -> EngineResult<Response> {
	Response::success(payload).map_err(|err| EngineError::Application(format!("failed to encode response: {err}")))
}
