//! End-to-end propagation run: session setup, health probe, scheduling, and teardown.

// self
use crate::{
	_prelude::*,
	config::Settings,
	http::{
		client::{ClientConfig, HttpClient, PROBE_TIMEOUT},
		retry::PROBE_ATTEMPTS,
	},
	metrics::{DEFAULT_WINDOW_SIZE, MetricsSink, WindowMetrics},
	scheduler::{runner::Scheduler, state::RunReport},
	signal::StopSignal,
};

/// Knobs for [`run`] that are not part of [`Settings`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceOptions {
	/// HTTP session configuration.
	pub client: ClientConfig,
	/// Attempts kept in the metrics window.
	pub window_size: usize,
	/// Per-request timeout of the health probe.
	pub probe_timeout: Duration,
	/// Attempts granted to the health probe.
	pub probe_attempts: u32,
	/// Fixed payload selection seed; `None` seeds from the OS.
	pub seed: Option<u64>,
}
impl Default for ServiceOptions {
	fn default() -> Self {
		Self {
			client: ClientConfig::default(),
			window_size: DEFAULT_WINDOW_SIZE,
			probe_timeout: PROBE_TIMEOUT,
			probe_attempts: PROBE_ATTEMPTS,
			seed: None,
		}
	}
}

/// Propagate events until `stop` fires.
///
/// When a health endpoint is configured it is probed first and an unhealthy consumer aborts the
/// run before any tick. The HTTP session is closed on every exit path, after the scheduler has
/// drained its deliveries.
pub async fn run<S>(settings: Settings, options: ServiceOptions, stop: &S) -> Result<RunReport>
where
	S: ?Sized + StopSignal,
{
	settings.validate()?;

	let metrics = Arc::new(WindowMetrics::with_capacity(options.window_size));
	let sink: Arc<dyn MetricsSink> = metrics.clone();
	let client = Arc::new(HttpClient::new(options.client)?.with_metrics(sink));

	if let Some(health_url) = &settings.health_url {
		tracing::info!(url = %health_url, "probing consumer health");

		if !client.probe(health_url, options.probe_timeout, options.probe_attempts).await {
			let url = health_url.clone();

			close(client);

			return Err(Error::Unhealthy { url });
		}
	}

	let mut scheduler = Scheduler::new(settings, client.clone());

	if let Some(seed) = options.seed {
		scheduler = scheduler.with_seed(seed);
	}

	let result = scheduler.run(stop).await;

	tracing::info!(summary = %metrics, "final delivery metrics");

	close(client);

	match &result {
		Ok(report) => tracing::info!(ticks = report.ticks, "propagation finished"),
		Err(err) => tracing::error!(error = %err, "propagation aborted"),
	}

	result
}

fn close(client: Arc<HttpClient>) {
	match Arc::try_unwrap(client) {
		Ok(client) => client.close(),
		Err(shared) => tracing::warn!(
			holders = Arc::strong_count(&shared),
			"http session still shared at shutdown, releasing on last drop"
		),
	}
}
