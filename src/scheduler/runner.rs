//! Drift-corrected periodic scheduler.
//!
//! Tick deadlines are computed additively from the start instant (`next_tick += period`), so slow
//! deliveries never push later ticks back. Each tick is handed to an independent delivery unit and
//! the loop moves straight on to its sleep.

// std
use std::future::Future;
// crates.io
use http::Response;
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tokio::{task, time};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	config::{Payload, Settings},
	http::{
		client::{DeliveryRequest, is_failure},
		retry::Transient,
	},
	scheduler::{
		inflight::InFlight,
		state::{RunReport, SchedulerState, UnitTally},
	},
	signal::StopSignal,
};

/// Performs one delivery for a tick.
///
/// Implemented by [`HttpClient`](crate::http::client::HttpClient); tests substitute their own.
pub trait Dispatch: 'static + Send + Sync {
	/// Deliver `request`, returning the consumer's response or the final error.
	fn dispatch(
		&self,
		request: DeliveryRequest,
	) -> impl Future<Output = Result<Response<()>>> + Send;
}

/// Periodic tick source driving delivery units.
#[derive(Debug)]
pub struct Scheduler<D> {
	settings: Arc<Settings>,
	dispatcher: Arc<D>,
	payloads: Vec<Arc<Payload>>,
	rng: SmallRng,
}
impl<D> Scheduler<D>
where
	D: Dispatch,
{
	/// Create a scheduler that picks payloads with an OS-seeded generator.
	pub fn new(settings: Settings, dispatcher: Arc<D>) -> Self {
		let payloads = settings.payloads.iter().cloned().map(Arc::new).collect();

		Self {
			settings: Arc::new(settings),
			dispatcher,
			payloads,
			rng: SmallRng::from_os_rng(),
		}
	}

	/// Use a deterministic payload selection sequence.
	pub fn with_seed(mut self, seed: u64) -> Self {
		self.rng = SmallRng::seed_from_u64(seed);

		self
	}

	/// Issue ticks until `stop` fires, then drain every in-flight delivery.
	///
	/// The stop signal is checked at each iteration boundary and raced against the per-tick sleep.
	/// Draining always runs, even when the tick loop fails, and the loop's error is returned only
	/// after every unit has settled.
	pub async fn run<S>(mut self, stop: &S) -> Result<RunReport>
	where
		S: ?Sized + StopSignal,
	{
		self.settings.validate()?;

		let started_at = Utc::now();
		let tally = Arc::new(UnitTally::default());
		let mut in_flight = InFlight::new();
		let mut ticks = 0;

		tracing::info!(
			period = ?self.settings.period,
			url = %self.settings.target_url,
			payloads = self.payloads.len(),
			state = ?SchedulerState::Running,
			"scheduler started"
		);

		let result = self.issue_ticks(stop, &mut in_flight, &tally, &mut ticks).await;

		tracing::info!(
			in_flight = in_flight.len(),
			state = ?SchedulerState::Draining,
			"draining in-flight deliveries"
		);

		in_flight.drain().await;

		let (delivered, failed, cancelled) = tally.snapshot();
		let report = RunReport {
			ticks,
			delivered,
			failed,
			cancelled,
			panicked: in_flight.panicked(),
			state: SchedulerState::Stopped,
			started_at,
			finished_at: Utc::now(),
		};

		tracing::info!(
			ticks,
			delivered,
			failed,
			cancelled,
			panicked = report.panicked,
			state = ?report.state,
			"scheduler stopped"
		);

		result.map(|()| report)
	}

	async fn issue_ticks<S>(
		&mut self,
		stop: &S,
		in_flight: &mut InFlight,
		tally: &Arc<UnitTally>,
		ticks: &mut u64,
	) -> Result<()>
	where
		S: ?Sized + StopSignal,
	{
		let period = self.settings.period;
		let mut next_tick = Instant::now();

		while !stop.should_stop() {
			in_flight.reap();

			let request = self.next_request(*ticks, next_tick);

			tracing::debug!(tick = *ticks, in_flight = in_flight.len(), "tick dispatched");

			self.spawn_unit(in_flight, tally, request);

			*ticks += 1;
			next_tick = next_tick.checked_add(period).ok_or_else(|| {
				Error::Scheduler(format!("tick deadline overflowed after {ticks} ticks"))
			})?;

			let now = Instant::now();
			let sleep_for = next_tick.saturating_duration_since(now);

			if sleep_for.is_zero() {
				if now > next_tick {
					tracing::debug!(behind = ?(now - next_tick), "scheduler running behind");
				}

				task::yield_now().await;
			} else {
				tokio::select! {
					biased;
					_ = stop.stopped() => {},
					_ = time::sleep(sleep_for) => {},
				}
			}
		}

		Ok(())
	}

	fn next_request(&mut self, tick: u64, ideal_time: Instant) -> DeliveryRequest {
		let index = self.rng.random_range(0..self.payloads.len());

		DeliveryRequest {
			tick,
			ideal_time,
			url: self.settings.target_url.clone(),
			payload: Arc::clone(&self.payloads[index]),
		}
	}

	fn spawn_unit(&self, in_flight: &mut InFlight, tally: &Arc<UnitTally>, request: DeliveryRequest) {
		let dispatcher = Arc::clone(&self.dispatcher);
		let tally = Arc::clone(tally);

		in_flight.spawn(request.tick, move |cancel| deliver_unit(dispatcher, tally, request, cancel));
	}
}

async fn deliver_unit<D>(
	dispatcher: Arc<D>,
	tally: Arc<UnitTally>,
	request: DeliveryRequest,
	cancel: CancellationToken,
) where
	D: Dispatch,
{
	let tick = request.tick;
	let url = request.url.clone();

	tokio::select! {
		biased;
		result = dispatcher.dispatch(request) => match result {
			Ok(response) => {
				tally.delivered();

				let status = response.status();

				if is_failure(status) {
					tracing::warn!(tick, %url, %status, "consumer returned an error status");
				} else {
					tracing::debug!(tick, %status, "delivery completed");
				}
			},
			Err(err) => {
				tally.failed();

				if err.is_unreachable() {
					tracing::warn!(tick, %url, error = %err, "consumer unreachable, event dropped");
				} else if err.is_transient() {
					tracing::warn!(
						tick,
						%url,
						error = %err,
						"delivery failed after retries, event dropped"
					);
				} else {
					tracing::error!(tick, %url, error = %err, "delivery failed");
				}
			},
		},
		_ = cancel.cancelled() => {
			tally.cancelled();

			tracing::info!(tick, "delivery cancelled during shutdown");
		},
	}
}
