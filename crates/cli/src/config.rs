//! Resolved runtime configuration for the daemon and the client.

use std::path::PathBuf;
use std::time::Duration;

use crate::browser::LaunchConfig;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);
/// Bound on re-navigating to the last page after a restart.
pub const DEFAULT_RESTORE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
	/// Directory holding the channel files.
	pub dir: PathBuf,
	pub poll_interval: Duration,
	pub navigation_timeout: Duration,
	pub restore_timeout: Duration,
	/// Ring-buffer size for captured console entries. `None` keeps everything.
	pub console_limit: Option<usize>,
	pub launch: LaunchConfig,
}

impl DaemonConfig {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
			restore_timeout: DEFAULT_RESTORE_TIMEOUT,
			console_limit: None,
			launch: LaunchConfig::default(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
	pub dir: PathBuf,
	pub poll_interval: Duration,
	pub response_timeout: Duration,
}

impl ClientConfig {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self {
			dir: dir.into(),
			poll_interval: DEFAULT_POLL_INTERVAL,
			response_timeout: DEFAULT_RESPONSE_TIMEOUT,
		}
	}
}
