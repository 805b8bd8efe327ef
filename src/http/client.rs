//! HTTP client for event delivery and the startup health probe.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use http::{Response, StatusCode};
use reqwest::{Client, redirect::Policy};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::{
	_prelude::*,
	config::Payload,
	http::retry::{RetryPolicy, Transient, retry},
	metrics::{self, AttemptOutcome, MetricsSink},
	scheduler::runner::Dispatch,
};

/// Per-request timeout applied to health probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// One tick's delivery job, handed from the scheduler to a delivery unit.
#[derive(Clone, Debug)]
pub struct DeliveryRequest {
	/// Zero-based tick index.
	pub tick: u64,
	/// Monotonic instant the tick was scheduled for.
	pub ideal_time: Instant,
	/// Consumer endpoint.
	pub url: Url,
	/// Event body, shared with the scheduler's payload set.
	pub payload: Arc<Payload>,
}

/// Tunables for the shared HTTP session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Total timeout for a single attempt.
	pub request_timeout: Duration,
	/// Timeout for establishing a connection.
	pub connect_timeout: Duration,
	/// `User-Agent` header sent with every request.
	pub user_agent: String,
	/// Redirects followed before giving up.
	pub max_redirects: usize,
	/// Retry policy applied to deliveries.
	pub retry_policy: RetryPolicy,
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			request_timeout: Duration::from_secs(30),
			connect_timeout: Duration::from_secs(5),
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
			max_redirects: 10,
			retry_policy: RetryPolicy::delivery(),
		}
	}
}

/// Long-lived HTTP session shared by every delivery unit.
pub struct HttpClient {
	client: Client,
	config: Arc<ClientConfig>,
	metrics: Option<Arc<dyn MetricsSink>>,
}
impl HttpClient {
	/// Build a session from `config`.
	pub fn new(config: ClientConfig) -> Result<Self> {
		config.retry_policy.validate()?;

		let client = Client::builder()
			.timeout(config.request_timeout)
			.connect_timeout(config.connect_timeout)
			.user_agent(config.user_agent.clone())
			.redirect(Policy::limited(config.max_redirects))
			.build()?;

		Ok(Self::with_client(client, config))
	}

	/// Wrap an existing `reqwest` client.
	pub fn with_client(client: Client, config: ClientConfig) -> Self {
		Self { client, config: Arc::new(config), metrics: None }
	}

	/// Report every delivery outcome to `sink`.
	pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
		self.metrics = Some(sink);

		self
	}

	/// Attached metrics sink, if any.
	pub fn metrics(&self) -> Option<&Arc<dyn MetricsSink>> {
		self.metrics.as_ref()
	}

	/// Session configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// GET `url` until it answers or `attempts` are spent.
	///
	/// Returns `true` only for a 2xx status; every failure is logged and reported as `false`.
	pub async fn probe(&self, url: &Url, timeout: Duration, attempts: u32) -> bool {
		let policy = RetryPolicy::probe().with_max_attempts(attempts);
		let result = retry(&policy, move || async move {
			let response = self.client.get(url.clone()).timeout(timeout).send().await?;

			Ok::<_, Error>(response.status())
		})
		.await;

		match result {
			Ok(status) => {
				let healthy = status.is_success();

				if healthy {
					tracing::info!(%url, %status, "health check passed");
				} else {
					tracing::warn!(%url, %status, "health check returned a non-success status");
				}

				healthy
			},
			Err(err) => {
				tracing::warn!(%url, error = %err, "health check failed");

				false
			},
		}
	}

	/// POST the request's payload through the retry policy and report the outcome.
	///
	/// HTTP error statuses are returned as responses. Transport failures that outlast the retry
	/// budget are recorded as failed outcomes and then propagated.
	pub async fn deliver(&self, request: &DeliveryRequest) -> Result<Response<()>> {
		let fired_at = Instant::now();
		let fired_at_wallclock = Utc::now();
		let result = retry(&self.config.retry_policy, move || self.post_once(request)).await;
		let status = result.as_ref().ok().map(|response| response.status().as_u16());
		let outcome = AttemptOutcome::new(request.ideal_time, fired_at, fired_at_wallclock, status);

		metrics::record_attempt(&outcome);

		if let Err(err) = &result
			&& err.is_transient()
		{
			tracing::debug!(
				tick = request.tick,
				attempts = self.config.retry_policy.attempts(),
				error = %err,
				"retries exhausted"
			);
			metrics::record_retry_exhausted();
		}

		tracing::debug!(tick = request.tick, %outcome, "delivery outcome");

		if let Some(sink) = &self.metrics {
			sink.update(outcome);

			tracing::info!(summary = %sink.summary(), "delivery metrics");
		}

		result
	}

	/// Tear the session down once no delivery unit holds it.
	pub fn close(self) {
		tracing::debug!(total_timeout = ?self.config.request_timeout, "http session closed");
	}

	async fn post_once(&self, request: &DeliveryRequest) -> Result<Response<()>> {
		let start = Instant::now();
		let response =
			self.client.post(request.url.clone()).json(request.payload.as_ref()).send().await?;
		let elapsed = start.elapsed();
		let status = response.status();
		let mut builder = Response::builder().status(status).version(response.version());

		if let Some(headers) = builder.headers_mut() {
			headers.extend(response.headers().iter().map(|(name, value)| (name.clone(), value.clone())));
		}

		let header_only = builder.body(()).map_err(Error::from)?;

		if is_failure(status) {
			let body = response.text().await.unwrap_or_default();

			tracing::debug!(
				tick = request.tick,
				%status,
				?elapsed,
				body = %truncate(&body, 512),
				"consumer rejected event"
			);
		} else {
			tracing::debug!(tick = request.tick, %status, ?elapsed, "event delivered");
		}

		Ok(header_only)
	}
}
impl Debug for HttpClient {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("HttpClient")
			.field("config", &self.config)
			.field("metrics", &self.metrics.is_some())
			.finish()
	}
}
impl Dispatch for HttpClient {
	async fn dispatch(&self, request: DeliveryRequest) -> Result<Response<()>> {
		self.deliver(&request).await
	}
}

/// Whether `status` counts as a failed delivery.
pub fn is_failure(status: StatusCode) -> bool {
	status.as_u16() >= metrics::FIRST_FAILING_STATUS
}

fn truncate(body: &str, max: usize) -> &str {
	match body.char_indices().nth(max) {
		Some((idx, _)) => &body[..idx],
		None => body,
	}
}
