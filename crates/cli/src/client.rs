//! Client side of the command channel.

use std::time::Instant;

use pw_protocol::{Command, Request};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::CommandChannel;
use crate::config::ClientConfig;
use crate::error::{PwError, Result};

pub struct DaemonClient {
	channel: CommandChannel,
	config: ClientConfig,
}

impl DaemonClient {
	pub fn new(config: ClientConfig) -> Self {
		Self {
			channel: CommandChannel::new(config.dir.clone()),
			config,
		}
	}

	pub fn channel(&self) -> &CommandChannel {
		&self.channel
	}

	/// Fails unless a ready marker names a live daemon process.
	pub fn ensure_running(&self) -> Result<()> {
		if !self.channel.is_ready() {
			return Err(self.not_running(false));
		}
		match self.channel.ready_pid() {
			Some(pid) if !process_alive(pid) => Err(self.not_running(true)),
			_ => Ok(()),
		}
	}

	/// Sends `command` and waits for the matching response.
	///
	/// Returns the response fields on success. An error response becomes
	/// [`PwError::CommandFailed`] with the daemon's message verbatim.
	pub async fn send(&self, command: &Command) -> Result<Map<String, Value>> {
		self.ensure_running()?;

		let id = Uuid::new_v4().to_string();
		let request = Request::new(command).with_id(id.clone());
		if !self.channel.try_send_request(&request)? {
			return Err(PwError::RequestPending(self.channel.request_path()));
		}
		debug!(target = "pw.channel", action = command.name(), id = %id, "waiting for response");

		let started = Instant::now();
		loop {
			if let Some(response) = self.channel.try_read_response(Some(&id))? {
				debug!(
					target = "pw.channel",
					id = %id,
					elapsed_ms = started.elapsed().as_millis() as u64,
					"response received"
				);
				return response.into_result().map_err(PwError::CommandFailed);
			}

			if self.ensure_running().is_err() {
				self.withdraw(&id);
				return Err(self.not_running(self.channel.is_ready()));
			}

			if started.elapsed() >= self.config.response_timeout {
				let withdrawn = self.withdraw(&id);
				return Err(PwError::ChannelTimeout {
					ms: self.config.response_timeout.as_millis() as u64,
					withdrawn,
				});
			}

			tokio::time::sleep(self.config.poll_interval).await;
		}
	}

	fn withdraw(&self, id: &str) -> bool {
		match self.channel.withdraw_request(id) {
			Ok(withdrawn) => withdrawn,
			Err(err) => {
				warn!(target = "pw.channel", id, error = %err, "failed to withdraw request");
				false
			}
		}
	}

	fn not_running(&self, stale: bool) -> PwError {
		PwError::DaemonNotRunning {
			dir: self.config.dir.clone(),
			stale,
		}
	}
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
	let Ok(pid) = libc::pid_t::try_from(pid) else {
		return false;
	};
	// Signal 0 checks existence only. EPERM means the process exists under another user.
	let rc = unsafe { libc::kill(pid, 0) };
	rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
	true
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pw_protocol::Response;
	use tempfile::TempDir;

	use super::*;

	fn client(tmp: &TempDir, timeout_ms: u64) -> DaemonClient {
		let mut config = ClientConfig::new(tmp.path());
		config.poll_interval = Duration::from_millis(10);
		config.response_timeout = Duration::from_millis(timeout_ms);
		DaemonClient::new(config)
	}

	#[tokio::test]
	async fn missing_ready_marker_is_not_running() {
		let tmp = TempDir::new().unwrap();
		let err = client(&tmp, 100).send(&Command::Status).await.unwrap_err();
		assert!(matches!(err, PwError::DaemonNotRunning { stale: false, .. }));
		assert!(!tmp.path().join(crate::channel::REQUEST_FILE).exists());
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn dead_pid_in_marker_is_stale() {
		let tmp = TempDir::new().unwrap();
		let client = client(&tmp, 100);
		// Larger than any default pid_max.
		client.channel().mark_ready(999_999_999).unwrap();

		let err = client.send(&Command::Status).await.unwrap_err();
		assert!(matches!(err, PwError::DaemonNotRunning { stale: true, .. }));
	}

	#[tokio::test]
	async fn occupied_slot_is_rejected() {
		let tmp = TempDir::new().unwrap();
		let client = client(&tmp, 100);
		client.channel().mark_ready(std::process::id()).unwrap();
		client
			.channel()
			.try_send_request(&Request::new(&Command::Console).with_id("other"))
			.unwrap();

		let err = client.send(&Command::Status).await.unwrap_err();
		assert!(matches!(err, PwError::RequestPending(_)));
	}

	#[tokio::test]
	async fn timeout_withdraws_unconsumed_request() {
		let tmp = TempDir::new().unwrap();
		let client = client(&tmp, 50);
		client.channel().mark_ready(std::process::id()).unwrap();

		let err = client.send(&Command::Status).await.unwrap_err();
		assert!(matches!(err, PwError::ChannelTimeout { ms: 50, withdrawn: true }));
		assert!(!client.channel().request_path().exists());
	}

	#[tokio::test]
	async fn error_response_becomes_command_failed() {
		let tmp = TempDir::new().unwrap();
		let client = client(&tmp, 2000);
		client.channel().mark_ready(std::process::id()).unwrap();

		let responder = {
			let channel = client.channel().clone();
			tokio::spawn(async move {
				loop {
					if let Some(crate::channel::Incoming::Request(request)) = channel.try_consume_request().unwrap() {
						let response = Response::error(format!("Unknown action: {}", request.action)).with_id(request.id);
						channel.write_response(&response).unwrap();
						break;
					}
					tokio::time::sleep(Duration::from_millis(5)).await;
				}
			})
		};

		let err = client.send(&Command::Status).await.unwrap_err();
		responder.await.unwrap();
		assert_eq!(err.to_string(), "Unknown action: status");
	}
}
