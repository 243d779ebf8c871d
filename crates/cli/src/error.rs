use std::path::PathBuf;

use thiserror::Error;

use crate::browser::EngineError;
use crate::output::{CommandError, ErrorCode};

pub type Result<T> = std::result::Result<T, PwError>;

#[derive(Debug, Error)]
pub enum PwError {
	/// No ready marker, or the marker names a process that is gone.
	#[error("daemon not running in {}{}", dir.display(), if *stale { " (stale ready marker)" } else { "" })]
	DaemonNotRunning { dir: PathBuf, stale: bool },

	/// A live daemon already serves this directory.
	#[error("daemon already running in {} (pid {pid})", dir.display())]
	DaemonAlreadyRunning { dir: PathBuf, pid: u32 },

	/// The request slot is occupied by another client's request.
	#[error("another request is already pending in {}", .0.display())]
	RequestPending(PathBuf),

	/// No response arrived in time. The daemon may or may not have seen the request.
	#[error("no response from daemon after {ms}ms{}", if *withdrawn { " (request withdrawn before the daemon picked it up)" } else { "" })]
	ChannelTimeout { ms: u64, withdrawn: bool },

	/// The daemon answered with an error response.
	#[error("{0}")]
	CommandFailed(String),

	/// The browser could not be started. Terminates the daemon.
	#[error("browser startup failed: {0}")]
	FatalStartup(String),

	#[error(transparent)]
	Engine(#[from] EngineError),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl PwError {
	pub fn code(&self) -> ErrorCode {
		match self {
			PwError::DaemonNotRunning { .. } => ErrorCode::DaemonNotRunning,
			PwError::DaemonAlreadyRunning { .. } => ErrorCode::InvalidInput,
			PwError::RequestPending(_) => ErrorCode::RequestPending,
			PwError::ChannelTimeout { .. } => ErrorCode::Timeout,
			PwError::CommandFailed(_) => ErrorCode::CommandFailed,
			PwError::FatalStartup(_) => ErrorCode::BrowserLaunchFailed,
			PwError::Engine(EngineError::Launch(_)) => ErrorCode::BrowserLaunchFailed,
			PwError::Engine(EngineError::SessionLost(_)) => ErrorCode::SessionError,
			PwError::Engine(EngineError::Application(_)) => ErrorCode::CommandFailed,
			PwError::Io(_) => ErrorCode::IoError,
			PwError::Json(_) | PwError::Anyhow(_) => ErrorCode::InternalError,
		}
	}

	/// Convert this error to a CommandError for structured output
	pub fn to_command_error(&self) -> CommandError {
		let details = match self {
			PwError::DaemonNotRunning { dir, stale } => Some(serde_json::json!({ "dir": dir, "stale": stale })),
			PwError::ChannelTimeout { ms, withdrawn } => Some(serde_json::json!({ "timeout_ms": ms, "withdrawn": withdrawn })),
			_ => None,
		};

		CommandError {
			code: self.code(),
			message: self.to_string(),
			details,
		}
	}
}
