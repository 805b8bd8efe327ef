//! Scheduler lifecycle states and run accounting.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use serde::Serialize;
// self
use crate::_prelude::*;

/// Scheduler lifecycle.
///
/// `Running` issues ticks; `Draining` waits for every in-flight delivery to finish or cancel;
/// `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
	/// Ticks are being issued.
	Running,
	/// No new ticks; waiting for in-flight deliveries.
	Draining,
	/// Every delivery has settled.
	Stopped,
}

/// Summary of a completed scheduler run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
	/// Ticks issued, one delivery unit each.
	pub ticks: u64,
	/// Units that received an HTTP response, including error statuses.
	pub delivered: u64,
	/// Units whose delivery raised an error.
	pub failed: u64,
	/// Units cancelled during draining.
	pub cancelled: u64,
	/// Units that panicked.
	pub panicked: u64,
	/// Final lifecycle state.
	pub state: SchedulerState,
	/// Wall-clock start of the run.
	pub started_at: DateTime<Utc>,
	/// Wall-clock end of the drain.
	pub finished_at: DateTime<Utc>,
}
impl RunReport {
	/// Units accounted for by any terminal outcome.
	pub fn settled(&self) -> u64 {
		self.delivered + self.failed + self.cancelled + self.panicked
	}
}

/// Outcome counters written by delivery units.
#[derive(Debug, Default)]
pub struct UnitTally {
	delivered: AtomicU64,
	failed: AtomicU64,
	cancelled: AtomicU64,
}
impl UnitTally {
	/// Count a unit that received a response.
	pub fn delivered(&self) {
		self.delivered.fetch_add(1, Ordering::Relaxed);
	}

	/// Count a unit whose delivery errored.
	pub fn failed(&self) {
		self.failed.fetch_add(1, Ordering::Relaxed);
	}

	/// Count a unit cancelled before completion.
	pub fn cancelled(&self) {
		self.cancelled.fetch_add(1, Ordering::Relaxed);
	}

	/// Snapshot as `(delivered, failed, cancelled)`.
	pub fn snapshot(&self) -> (u64, u64, u64) {
		(
			self.delivered.load(Ordering::Relaxed),
			self.failed.load(Ordering::Relaxed),
			self.cancelled.load(Ordering::Relaxed),
		)
	}
}
