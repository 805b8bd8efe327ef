//! Registry of delivery units that have been spawned but not yet settled.

// std
use std::future::Future;
// crates.io
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Spawned delivery units, owned by the scheduler loop.
///
/// Units run independently of the loop; finished ones are reaped at tick boundaries and the rest
/// are cancelled and awaited by [`InFlight::drain`]. Dropping the registry aborts every unit.
#[derive(Debug, Default)]
pub struct InFlight {
	tasks: JoinSet<()>,
	cancel: CancellationToken,
	panicked: u64,
}
impl InFlight {
	/// Create an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Spawn the unit for `tick`; it receives a token cancelled when draining starts.
	pub fn spawn<F, Fut>(&mut self, tick: u64, unit: F)
	where
		F: FnOnce(CancellationToken) -> Fut,
		Fut: 'static + Send + Future<Output = ()>,
	{
		let token = self.cancel.child_token();

		self.tasks.spawn(unit(token).instrument(tracing::debug_span!("delivery", tick)));
	}

	/// Collect units that already finished without waiting for the rest.
	pub fn reap(&mut self) -> usize {
		let mut reaped = 0;

		while let Some(result) = self.tasks.try_join_next() {
			self.settle(result);

			reaped += 1;
		}

		reaped
	}

	/// Units spawned and not yet reaped.
	pub fn len(&self) -> usize {
		self.tasks.len()
	}

	/// Whether no unit is outstanding.
	pub fn is_empty(&self) -> bool {
		self.tasks.is_empty()
	}

	/// Units that panicked so far.
	pub fn panicked(&self) -> u64 {
		self.panicked
	}

	/// Cancel every outstanding unit and wait until all of them have settled.
	pub async fn drain(&mut self) {
		self.cancel.cancel();

		while let Some(result) = self.tasks.join_next().await {
			self.settle(result);
		}
	}

	fn settle(&mut self, result: Result<(), JoinError>) {
		match result {
			Ok(()) => {},
			Err(err) if err.is_panic() => {
				self.panicked += 1;

				tracing::error!(error = %err, "delivery unit panicked");
			},
			Err(err) => tracing::debug!(error = %err, "delivery unit aborted"),
		}
	}
}
