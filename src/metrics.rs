//! Delivery metrics: sliding-window summaries and optional exporter counters.
//!
//! [`WindowMetrics`] keeps the last `capacity` attempt outcomes and renders a one-line summary for
//! the logs. With the `metrics` feature enabled, every recorded attempt is also forwarded to the
//! [`metrics`](https://docs.rs/metrics) facade; the `prometheus` feature adds an installable
//! Prometheus recorder.

// std
use std::{
	collections::VecDeque,
	fmt::{Display, Formatter, Result as FmtResult},
	sync::{Mutex, MutexGuard, PoisonError},
};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use chrono::SecondsFormat;
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_DELIVERIES_TOTAL: &str = "event_propagator_deliveries_total";
#[cfg(feature = "metrics")]
const METRIC_JITTER: &str = "event_propagator_delivery_jitter_seconds";
#[cfg(feature = "metrics")]
const METRIC_RETRY_EXHAUSTED: &str = "event_propagator_retry_exhausted_total";

/// Default number of attempts retained by [`WindowMetrics`].
pub const DEFAULT_WINDOW_SIZE: usize = 100;
/// Lowest HTTP status counted as a failed delivery.
pub const FIRST_FAILING_STATUS: u16 = 400;

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Timing and result of one completed delivery.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptOutcome {
	/// Ideal tick time the delivery was scheduled for.
	pub scheduled_at: Instant,
	/// Monotonic time the request left the scheduler's hands.
	pub fired_at: Instant,
	/// Wall-clock counterpart of `fired_at`, rendered by the [`Display`] impl.
	pub fired_at_wallclock: DateTime<Utc>,
	/// Whether the attempt counts as a failure.
	pub failed: bool,
	/// Final HTTP status, absent when no response arrived.
	pub status_code: Option<u16>,
}
impl AttemptOutcome {
	/// Build an outcome, classifying missing statuses and statuses `>= 400` as failures.
	pub fn new(
		scheduled_at: Instant,
		fired_at: Instant,
		fired_at_wallclock: DateTime<Utc>,
		status_code: Option<u16>,
	) -> Self {
		let failed = status_code.is_none_or(|status| status >= FIRST_FAILING_STATUS);

		Self { scheduled_at, fired_at, fired_at_wallclock, failed, status_code }
	}

	/// Signed deviation of `fired_at` from `scheduled_at`, in milliseconds.
	pub fn jitter_ms(&self) -> f64 {
		match self.fired_at.checked_duration_since(self.scheduled_at) {
			Some(late) => late.as_secs_f64() * 1_000.0,
			None => -(self.scheduled_at - self.fired_at).as_secs_f64() * 1_000.0,
		}
	}
}
impl Display for AttemptOutcome {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(
			f,
			"fired={} | jitter={:+.1} ms | status=",
			self.fired_at_wallclock.to_rfc3339_opts(SecondsFormat::Millis, true),
			self.jitter_ms()
		)?;

		match self.status_code {
			Some(status) => write!(f, "{status}"),
			None => write!(f, "---"),
		}
	}
}

/// Sink for per-attempt delivery outcomes.
///
/// Implementations are shared across delivery tasks and must serialise their own updates.
pub trait MetricsSink: Send + Sync {
	/// Record a finished attempt.
	fn update(&self, outcome: AttemptOutcome);

	/// Summarise the attempts recorded so far.
	fn summary(&self) -> MetricsSummary;
}

/// Point-in-time view of the metrics window.
#[derive(Clone, Debug, PartialEq)]
pub enum MetricsSummary {
	/// Nothing has been recorded yet.
	Waiting,
	/// Statistics over the current window.
	Window(WindowSummary),
}
impl MetricsSummary {
	/// Window statistics when any data has been recorded.
	pub fn window(&self) -> Option<&WindowSummary> {
		match self {
			MetricsSummary::Waiting => None,
			MetricsSummary::Window(summary) => Some(summary),
		}
	}
}
impl Display for MetricsSummary {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		match self {
			MetricsSummary::Waiting => write!(f, "Metrics: waiting for data …"),
			MetricsSummary::Window(summary) => Display::fmt(summary, f),
		}
	}
}

/// Statistics computed over the retained samples.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSummary {
	/// Mean scheduling jitter in milliseconds.
	pub mean_jitter_ms: f64,
	/// Status code of the most recent sample.
	pub last_status: Option<u16>,
	/// Share of failed samples, as a percentage.
	pub failure_pct: f64,
	/// Samples currently held.
	pub window_len: usize,
	/// Maximum samples held.
	pub window_capacity: usize,
	/// Samples ever recorded, including evicted ones.
	pub total_seen: u64,
}
impl Display for WindowSummary {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "jitter={:5.1} ms | status=", self.mean_jitter_ms)?;

		match self.last_status {
			Some(status) => write!(f, "{status:3}")?,
			None => write!(f, "---")?,
		}

		write!(
			f,
			" | fail={:5.1}% | win={}/{} | total={}",
			self.failure_pct, self.window_len, self.window_capacity, self.total_seen
		)
	}
}

/// In-memory sliding window over the most recent attempts.
#[derive(Debug)]
pub struct WindowMetrics {
	window: Mutex<Window>,
}
impl WindowMetrics {
	/// Create a window holding [`DEFAULT_WINDOW_SIZE`] samples.
	pub fn new() -> Self {
		Self::with_capacity(DEFAULT_WINDOW_SIZE)
	}

	/// Create a window holding `capacity` samples (at least one).
	pub fn with_capacity(capacity: usize) -> Self {
		let capacity = capacity.max(1);

		Self {
			window: Mutex::new(Window {
				capacity,
				samples: VecDeque::with_capacity(capacity),
				total_seen: 0,
			}),
		}
	}

	/// Maximum number of retained samples.
	pub fn capacity(&self) -> usize {
		self.lock().capacity
	}

	fn lock(&self) -> MutexGuard<'_, Window> {
		self.window.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
impl Default for WindowMetrics {
	fn default() -> Self {
		Self::new()
	}
}
impl MetricsSink for WindowMetrics {
	fn update(&self, outcome: AttemptOutcome) {
		let sample = Sample {
			jitter_ms: outcome.jitter_ms(),
			failed: outcome.failed,
			status_code: outcome.status_code,
		};

		self.lock().push(sample);
	}

	fn summary(&self) -> MetricsSummary {
		self.lock().summary()
	}
}
impl Display for WindowMetrics {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		Display::fmt(&self.summary(), f)
	}
}

/// Sink used when metrics are disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;
impl MetricsSink for NoopMetrics {
	fn update(&self, _: AttemptOutcome) {}

	fn summary(&self) -> MetricsSummary {
		MetricsSummary::Waiting
	}
}

#[derive(Debug)]
struct Window {
	capacity: usize,
	samples: VecDeque<Sample>,
	total_seen: u64,
}
impl Window {
	fn push(&mut self, sample: Sample) {
		if self.samples.len() == self.capacity {
			self.samples.pop_front();
		}

		self.samples.push_back(sample);
		self.total_seen = self.total_seen.saturating_add(1);
	}

	fn summary(&self) -> MetricsSummary {
		let Some(last) = self.samples.back() else {
			return MetricsSummary::Waiting;
		};
		let len = self.samples.len();
		let failures = self.samples.iter().filter(|sample| sample.failed).count();
		let jitter_sum: f64 = self.samples.iter().map(|sample| sample.jitter_ms).sum();

		MetricsSummary::Window(WindowSummary {
			mean_jitter_ms: jitter_sum / len as f64,
			last_status: last.status_code,
			failure_pct: failures as f64 / len as f64 * 100.0,
			window_len: len,
			window_capacity: self.capacity,
			total_seen: self.total_seen,
		})
	}
}

#[derive(Clone, Copy, Debug)]
struct Sample {
	jitter_ms: f64,
	failed: bool,
	status_code: Option<u16>,
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Forward a finished attempt to the `metrics` facade.
pub fn record_attempt(outcome: &AttemptOutcome) {
	#[cfg(feature = "metrics")]
	{
		let labels = outcome_labels(outcome);

		metrics::counter!(METRIC_DELIVERIES_TOTAL, labels.iter()).increment(1);
		metrics::histogram!(METRIC_JITTER).record(outcome.jitter_ms() / 1_000.0);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = outcome;
}

/// Record a delivery whose transient failures outlasted the retry budget.
pub fn record_retry_exhausted() {
	#[cfg(feature = "metrics")]
	metrics::counter!(METRIC_RETRY_EXHAUSTED).increment(1);
}

#[cfg(feature = "metrics")]
fn outcome_labels(outcome: &AttemptOutcome) -> LabelSet {
	let mut labels = LabelSet::with_capacity(2);

	labels.push(Label::new("outcome", if outcome.failed { "failure" } else { "success" }));
	labels.push(Label::new(
		"status",
		outcome.status_code.map_or_else(|| "none".to_owned(), |status| status.to_string()),
	));

	labels
}
