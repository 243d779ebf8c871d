//! File-backed command channel.
//!
//! One request slot, one response slot and a ready marker, all in the daemon
//! working directory. There is no framing: a slot is occupied when its file
//! exists. Writers stage content in a private temp file and publish it with a
//! single link or rename, so readers only ever see complete files. Readers
//! claim a slot by renaming it to a private path before reading, so each
//! request is consumed once and each response is collected once.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use pw_protocol::{Request, Response};
use tracing::{debug, warn};

use crate::error::Result;

pub const REQUEST_FILE: &str = ".pw-request.json";
pub const RESPONSE_FILE: &str = ".pw-response.json";
pub const READY_FILE: &str = ".pw-ready";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A consumed request slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
	Request(Request),
	/// The slot held something that is not a request.
	///
	/// `id` is recovered from the raw JSON when present, so the error
	/// response still reaches the sender.
	Malformed { id: Option<String>, reason: String },
}

#[derive(Debug, Clone)]
pub struct CommandChannel {
	dir: PathBuf,
}

impl CommandChannel {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		Self { dir: dir.into() }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn request_path(&self) -> PathBuf {
		self.dir.join(REQUEST_FILE)
	}

	pub fn response_path(&self) -> PathBuf {
		self.dir.join(RESPONSE_FILE)
	}

	pub fn ready_path(&self) -> PathBuf {
		self.dir.join(READY_FILE)
	}

	/// Places `request` in the request slot.
	///
	/// Returns `false` without writing when a request is already pending.
	pub fn try_send_request(&self, request: &Request) -> Result<bool> {
		let payload = serde_json::to_vec(request)?;
		let staged = self.stage(&payload)?;
		let linked = fs::hard_link(&staged, self.request_path());
		let _ = fs::remove_file(&staged);

		match linked {
			Ok(()) => {
				debug!(target = "pw.channel", action = %request.action, id = ?request.id, "request sent");
				Ok(true)
			}
			Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
			Err(err) => Err(err.into()),
		}
	}

	/// Claims and removes the pending request, if any.
	///
	/// The slot is free once this returns, whether or not the content decoded.
	pub fn try_consume_request(&self) -> Result<Option<Incoming>> {
		let Some(bytes) = self.claim(&self.request_path())? else {
			return Ok(None);
		};

		let incoming = match serde_json::from_slice::<Request>(&bytes) {
			Ok(request) => Incoming::Request(request),
			Err(err) => {
				warn!(target = "pw.channel", error = %err, bytes = bytes.len(), "malformed request consumed");
				Incoming::Malformed {
					id: salvage_id(&bytes),
					reason: err.to_string(),
				}
			}
		};
		Ok(Some(incoming))
	}

	/// Removes a pending request only if it is the one identified by `id`.
	///
	/// Returns `true` when the request was withdrawn before the daemon saw it.
	pub fn withdraw_request(&self, id: &str) -> Result<bool> {
		let path = self.request_path();
		let peeked = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
			Err(err) => return Err(err.into()),
		};
		if salvage_id(&peeked).as_deref() != Some(id) {
			return Ok(false);
		}

		// The daemon may have consumed it, or another client refilled the slot.
		let Some(bytes) = self.claim(&path)? else {
			return Ok(false);
		};
		if salvage_id(&bytes).as_deref() != Some(id) {
			self.restore(&path, &bytes)?;
			return Ok(false);
		}
		Ok(true)
	}

	/// Overwrites the response slot.
	pub fn write_response(&self, response: &Response) -> Result<()> {
		let payload = serde_json::to_vec(response)?;
		let staged = self.stage(&payload)?;
		if let Err(err) = fs::rename(&staged, self.response_path()) {
			let _ = fs::remove_file(&staged);
			return Err(err.into());
		}
		debug!(target = "pw.channel", id = ?response.id, success = response.is_success(), "response written");
		Ok(())
	}

	/// Collects the response for request `id`, removing it from the slot.
	///
	/// A response for a different request is left in place for its owner.
	pub fn try_read_response(&self, id: Option<&str>) -> Result<Option<Response>> {
		let path = self.response_path();
		let peeked = match fs::read(&path) {
			Ok(bytes) => bytes,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		};
		if serde_json::from_slice::<Response>(&peeked)?.id.as_deref() != id {
			return Ok(None);
		}

		// The slot may have been overwritten between the peek and the claim.
		let Some(bytes) = self.claim(&path)? else {
			return Ok(None);
		};
		let response: Response = serde_json::from_slice(&bytes)?;
		if response.id.as_deref() != id {
			self.restore(&path, &bytes)?;
			return Ok(None);
		}
		Ok(Some(response))
	}

	/// Publishes the ready marker with the daemon pid.
	pub fn mark_ready(&self, pid: u32) -> Result<()> {
		let staged = self.stage(pid.to_string().as_bytes())?;
		fs::rename(&staged, self.ready_path())?;
		Ok(())
	}

	pub fn is_ready(&self) -> bool {
		self.ready_path().exists()
	}

	/// Pid recorded in the ready marker, when present and readable.
	pub fn ready_pid(&self) -> Option<u32> {
		fs::read_to_string(self.ready_path()).ok()?.trim().parse().ok()
	}

	/// Removes request, response and ready files. Missing files are fine.
	pub fn clear_artifacts(&self) -> Result<()> {
		for path in [self.request_path(), self.response_path(), self.ready_path()] {
			match fs::remove_file(&path) {
				Ok(()) => debug!(target = "pw.channel", path = %path.display(), "removed channel artifact"),
				Err(err) if err.kind() == ErrorKind::NotFound => {}
				Err(err) => return Err(err.into()),
			}
		}
		Ok(())
	}

	fn temp_path(&self) -> PathBuf {
		let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
		self.dir.join(format!(".pw-{}-{n}.tmp", std::process::id()))
	}

	fn stage(&self, payload: &[u8]) -> Result<PathBuf> {
		let path = self.temp_path();
		fs::write(&path, payload)?;
		Ok(path)
	}

	/// Moves `slot` to a private path, reads it, and deletes it.
	fn claim(&self, slot: &Path) -> Result<Option<Vec<u8>>> {
		let claimed = self.temp_path();
		match fs::rename(slot, &claimed) {
			Ok(()) => {}
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(err.into()),
		}
		let bytes = fs::read(&claimed);
		let _ = fs::remove_file(&claimed);
		Ok(Some(bytes?))
	}

	/// Puts claimed content back unless the slot was refilled meanwhile.
	///
	/// Returns `false` when the newer content won and `bytes` were discarded.
	fn restore(&self, slot: &Path, bytes: &[u8]) -> Result<bool> {
		let staged = self.stage(bytes)?;
		let linked = fs::hard_link(&staged, slot);
		let _ = fs::remove_file(&staged);
		match linked {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == ErrorKind::AlreadyExists => {
				warn!(
					target = "pw.channel",
					slot = %slot.display(),
					id = ?salvage_id(bytes),
					"slot refilled while claimed; claimed content dropped"
				);
				Ok(false)
			}
			Err(err) => Err(err.into()),
		}
	}
}

/// Best-effort `id` from a slot file that may not decode as a full message.
fn salvage_id(bytes: &[u8]) -> Option<String> {
	serde_json::from_slice::<serde_json::Value>(bytes)
		.ok()?
		.get("id")?
		.as_str()
		.map(str::to_owned)
}

#[cfg(test)]
mod tests {
	use pw_protocol::Command;
	use tempfile::TempDir;

	use super::*;

	fn channel() -> (TempDir, CommandChannel) {
		let tmp = TempDir::new().unwrap();
		let channel = CommandChannel::new(tmp.path());
		(tmp, channel)
	}

	fn leftover_files(dir: &Path) -> Vec<String> {
		let mut names: Vec<_> = fs::read_dir(dir)
			.unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
			.collect();
		names.sort();
		names
	}

	#[test]
	fn second_send_is_rejected_while_request_pending() {
		let (_tmp, channel) = channel();
		let first = Request::new(&Command::Status).with_id("1");
		let second = Request::new(&Command::Console).with_id("2");

		assert!(channel.try_send_request(&first).unwrap());
		assert!(!channel.try_send_request(&second).unwrap());

		let consumed = channel.try_consume_request().unwrap();
		assert_eq!(consumed, Some(Incoming::Request(first)));
	}

	#[test]
	fn consume_frees_the_slot_and_leaves_no_temp_files() {
		let (tmp, channel) = channel();
		channel.try_send_request(&Request::new(&Command::Status)).unwrap();

		assert!(channel.try_consume_request().unwrap().is_some());
		assert!(channel.try_consume_request().unwrap().is_none());
		assert!(leftover_files(tmp.path()).is_empty());
	}

	#[test]
	fn malformed_request_is_consumed_once() {
		let (_tmp, channel) = channel();
		fs::write(channel.request_path(), b"{ not json").unwrap();

		assert!(matches!(
			channel.try_consume_request().unwrap(),
			Some(Incoming::Malformed { id: None, .. })
		));
		assert!(!channel.request_path().exists());
		assert!(channel.try_consume_request().unwrap().is_none());
	}

	#[test]
	fn malformed_request_keeps_its_id() {
		let (_tmp, channel) = channel();
		fs::write(channel.request_path(), br#"{"id":"c-1","action":5,"data":{}}"#).unwrap();

		match channel.try_consume_request().unwrap() {
			Some(Incoming::Malformed { id, reason }) => {
				assert_eq!(id.as_deref(), Some("c-1"));
				assert!(reason.contains("invalid type"), "reason: {reason}");
			}
			other => panic!("unexpected: {other:?}"),
		}
	}

	#[test]
	fn response_is_collected_by_matching_id_only() {
		let (_tmp, channel) = channel();
		let response = Response::error("boom").with_id(Some("a".into()));
		channel.write_response(&response).unwrap();

		assert_eq!(channel.try_read_response(Some("b")).unwrap(), None);
		assert!(channel.response_path().exists());

		assert_eq!(channel.try_read_response(Some("a")).unwrap(), Some(response));
		assert!(!channel.response_path().exists());
		assert_eq!(channel.try_read_response(Some("a")).unwrap(), None);
	}

	#[test]
	fn response_write_overwrites_previous() {
		let (_tmp, channel) = channel();
		channel.write_response(&Response::error("old")).unwrap();
		channel.write_response(&Response::error("new")).unwrap();

		let collected = channel.try_read_response(None).unwrap().unwrap();
		assert_eq!(collected.error.as_deref(), Some("new"));
	}

	#[test]
	fn withdraw_only_removes_own_request() {
		let (_tmp, channel) = channel();
		channel
			.try_send_request(&Request::new(&Command::Status).with_id("mine"))
			.unwrap();

		assert!(!channel.withdraw_request("other").unwrap());
		assert!(channel.request_path().exists());

		assert!(channel.withdraw_request("mine").unwrap());
		assert!(!channel.request_path().exists());
		assert!(!channel.withdraw_request("mine").unwrap());
	}

	#[cfg(unix)]
	#[test]
	fn withdraw_leaves_foreign_request_untouched() {
		use std::os::unix::fs::MetadataExt;

		let (_tmp, channel) = channel();
		channel
			.try_send_request(&Request::new(&Command::Status).with_id("theirs"))
			.unwrap();
		let before = fs::metadata(channel.request_path()).unwrap().ino();

		assert!(!channel.withdraw_request("mine").unwrap());
		assert_eq!(fs::metadata(channel.request_path()).unwrap().ino(), before);
	}

	#[test]
	fn restore_yields_to_a_refilled_slot() {
		let (tmp, channel) = channel();
		let claimed = Request::new(&Command::Status).with_id("b");
		let newer = Request::new(&Command::Console).with_id("c");
		channel.try_send_request(&newer).unwrap();

		let restored = channel
			.restore(&channel.request_path(), &serde_json::to_vec(&claimed).unwrap())
			.unwrap();

		assert!(!restored);
		assert_eq!(channel.try_consume_request().unwrap(), Some(Incoming::Request(newer)));
		assert!(leftover_files(tmp.path()).is_empty());
	}

	#[test]
	fn ready_marker_round_trip_and_cleanup() {
		let (tmp, channel) = channel();
		assert!(!channel.is_ready());
		assert_eq!(channel.ready_pid(), None);

		channel.mark_ready(4242).unwrap();
		assert!(channel.is_ready());
		assert_eq!(channel.ready_pid(), Some(4242));

		channel.try_send_request(&Request::new(&Command::Status)).unwrap();
		channel.write_response(&Response::error("stale")).unwrap();
		channel.clear_artifacts().unwrap();
		assert!(leftover_files(tmp.path()).is_empty());

		// Clearing an already clean directory is fine.
		channel.clear_artifacts().unwrap();
	}
}
