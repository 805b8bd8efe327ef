//! Retry utilities for HTTP requests.
//!
//! Attempts are bounded by [`RetryPolicy::max_attempts`]; the delay before retry `n` is read from
//! a fixed ascending table whose last entry repeats. Only [`Transient`] failures are retried.

// std
use std::{fmt::Display, future::Future};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::time;
// self
use crate::_prelude::*;

/// Backoff table shared by delivery and probe calls.
pub const DEFAULT_BACKOFF: [Duration; 3] =
	[Duration::from_millis(200), Duration::from_millis(500), Duration::from_secs(1)];
/// Attempts granted to a single event delivery.
pub const DELIVERY_ATTEMPTS: u32 = 3;
/// Attempts granted to the startup health probe.
pub const PROBE_ATTEMPTS: u32 = 5;
/// Upper bound accepted by [`RetryPolicy::validate`].
pub const MAX_ATTEMPTS: u32 = 32;

/// Classifies a failure as retryable.
pub trait Transient {
	/// Whether another attempt may succeed without any change to the request.
	fn is_transient(&self) -> bool;
}
impl Transient for Error {
	fn is_transient(&self) -> bool {
		match self {
			Error::Reqwest(err) =>
				err.is_connect()
					|| err.is_timeout()
					|| err.is_request()
					|| err.is_body()
					|| err.is_decode(),
			Error::Io(_) => true,
			_ => false,
		}
	}
}

/// Attempt budget and backoff table for one wrapped call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Total attempts including the first; `1` disables retrying.
	pub max_attempts: u32,
	/// Ascending delays slept between attempts; the last value repeats.
	pub delays: Vec<Duration>,
}
impl RetryPolicy {
	/// Build a policy from an attempt budget and a delay table.
	pub fn new(max_attempts: u32, delays: impl Into<Vec<Duration>>) -> Self {
		Self { max_attempts, delays: delays.into() }
	}

	/// Policy applied to event deliveries.
	pub fn delivery() -> Self {
		Self::new(DELIVERY_ATTEMPTS, DEFAULT_BACKOFF)
	}

	/// Policy applied to the startup health probe.
	pub fn probe() -> Self {
		Self::new(PROBE_ATTEMPTS, DEFAULT_BACKOFF)
	}

	/// Replace the attempt budget.
	pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
		self.max_attempts = max_attempts;

		self
	}

	/// Effective attempt budget; a zero budget still runs the operation once.
	pub fn attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}

	/// Delay slept after the failed attempt at `attempt_index` (zero-based).
	pub fn delay_for(&self, attempt_index: u32) -> Duration {
		match self.delays.len() {
			0 => Duration::ZERO,
			len => self.delays[(attempt_index as usize).min(len - 1)],
		}
	}

	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.max_attempts > MAX_ATTEMPTS {
			return Err(Error::Validation {
				field: "retry_policy.max_attempts",
				reason: format!("Must be at most {MAX_ATTEMPTS}."),
			});
		}
		if self.delays.windows(2).any(|pair| pair[1] < pair[0]) {
			return Err(Error::Validation {
				field: "retry_policy.delays",
				reason: "Must be in ascending order.".into(),
			});
		}

		Ok(())
	}

	/// Run `op` under this policy; see [`retry`].
	pub async fn run<T, E, F, Fut>(&self, op: F) -> std::result::Result<T, E>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = std::result::Result<T, E>>,
		E: Transient + Display,
	{
		retry(self, op).await
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self::delivery()
	}
}

/// Tracks consumed attempts and yields the backoff for the next one.
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	attempts_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Create a new executor respecting the supplied retry policy.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, attempts_used: 0 }
	}

	/// Record that an attempt is about to run.
	pub fn begin_attempt(&mut self) {
		self.attempts_used = self.attempts_used.saturating_add(1);
	}

	/// Number of attempts that have already been started.
	pub fn attempts_used(&self) -> u32 {
		self.attempts_used
	}

	/// Whether another attempt is permitted under the policy.
	pub fn can_retry(&self) -> bool {
		self.attempts_used < self.policy.attempts()
	}

	/// Backoff to sleep before the next attempt, or `None` once the budget is spent.
	pub fn next_backoff(&self) -> Option<Duration> {
		if !self.can_retry() {
			tracing::debug!(attempts = self.attempts_used, "retry budget exhausted");

			return None;
		}

		let delay = self.policy.delay_for(self.attempts_used.saturating_sub(1));

		tracing::debug!(attempt = self.attempts_used + 1, ?delay, "retry backoff computed");

		Some(delay)
	}
}

/// Run `op` until it succeeds, fails permanently, or exhausts the policy's attempts.
///
/// Transient failures are retried after the scheduled backoff. Permanent failures and the final
/// transient failure are returned unchanged. Sleeping yields to the runtime, so other tasks keep
/// running during backoff.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> std::result::Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = std::result::Result<T, E>>,
	E: Transient + Display,
{
	let mut executor = RetryExecutor::new(policy);

	loop {
		executor.begin_attempt();

		let err = match op().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if !err.is_transient() {
			tracing::debug!(
				attempt = executor.attempts_used(),
				error = %err,
				"permanent failure, not retrying"
			);

			return Err(err);
		}

		match executor.next_backoff() {
			Some(delay) => {
				tracing::debug!(
					attempt = executor.attempts_used(),
					error = %err,
					?delay,
					"transient failure, retrying"
				);

				if !delay.is_zero() {
					time::sleep(delay).await;
				}
			},
			None => {
				tracing::debug!(
					attempts = executor.attempts_used(),
					error = %err,
					"retry exhausted"
				);

				return Err(err);
			},
		}
	}
}
