//! In-memory console log buffer.
//!
//! Engine event listeners append into a [`ConsoleLog`] while the dispatcher
//! reads and clears it. The buffer outlives individual browser sessions, so a
//! restart keeps the debugging history.
//!
//! The buffer is unbounded unless a limit is configured. With a limit it
//! behaves as a ring buffer and counts evicted entries, which `console`
//! responses report as `dropped`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use pw_protocol::ConsoleLogEntry;
use tracing::debug;

#[derive(Debug, Default)]
struct Buffer {
	entries: VecDeque<ConsoleLogEntry>,
	dropped: u64,
}

/// Shared handle to the console buffer. Clones refer to the same buffer.
#[derive(Debug, Clone, Default)]
pub struct ConsoleLog {
	inner: Arc<Mutex<Buffer>>,
	limit: Option<usize>,
}

impl ConsoleLog {
	/// Creates an unbounded buffer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a buffer that keeps at most `limit` entries when `Some`.
	pub fn with_limit(limit: Option<usize>) -> Self {
		Self {
			inner: Arc::default(),
			limit: limit.filter(|n| *n > 0),
		}
	}

	pub fn limit(&self) -> Option<usize> {
		self.limit
	}

	pub fn append(&self, entry: ConsoleLogEntry) {
		let mut buffer = self.lock();
		if let Some(limit) = self.limit {
			while buffer.entries.len() >= limit {
				buffer.entries.pop_front();
				buffer.dropped += 1;
			}
		}
		buffer.entries.push_back(entry);
	}

	/// Returns all buffered entries in arrival order.
	pub fn snapshot(&self) -> Vec<ConsoleLogEntry> {
		self.lock().entries.iter().cloned().collect()
	}

	pub fn clear(&self) {
		let mut buffer = self.lock();
		debug!(target = "pw.console", cleared = buffer.entries.len(), "console buffer cleared");
		buffer.entries.clear();
		buffer.dropped = 0;
	}

	pub fn len(&self) -> usize {
		self.lock().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Entries evicted by the limit since the last clear.
	pub fn dropped(&self) -> u64 {
		self.lock().dropped
	}

	fn lock(&self) -> MutexGuard<'_, Buffer> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}
}
