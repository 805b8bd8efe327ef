//! Runtime configuration sourced from CLI flags and the environment.
//!
//! Every flag falls back to its environment variable, so container deployments can configure the
//! propagator purely through `PERIOD_IN_SECONDS`, `HTTP_POST_ENDPOINT`, `PAYLOAD_FILE_PATH`, and
//! the optional `HEALTH_CHECK_ENDPOINT`.

// std
use std::{
	fs,
	io::ErrorKind,
	path::{Path, PathBuf},
};
// crates.io
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use url::Url;
// self
use crate::{_prelude::*, metrics::DEFAULT_WINDOW_SIZE};

/// JSON object sent as one event body.
pub type Payload = Map<String, Value>;

/// Validated settings consumed by the scheduler and the service.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
	/// Interval between ticks.
	pub period: Duration,
	/// Consumer endpoint receiving the POSTs.
	pub target_url: Url,
	/// Candidate event bodies; one is picked per tick.
	pub payloads: Vec<Payload>,
	/// Endpoint probed once before the first tick.
	pub health_url: Option<Url>,
}
impl Settings {
	/// Construct settings without a health endpoint.
	pub fn new(period: Duration, target_url: Url, payloads: Vec<Payload>) -> Self {
		Self { period, target_url, payloads, health_url: None }
	}

	/// Probe `health_url` before starting.
	pub fn with_health_url(mut self, health_url: Url) -> Self {
		self.health_url = Some(health_url);

		self
	}

	/// Check the invariants the scheduler relies on.
	pub fn validate(&self) -> Result<()> {
		if self.payloads.is_empty() {
			return Err(Error::Validation {
				field: "payloads",
				reason: "At least one payload is required.".into(),
			});
		}

		Ok(())
	}
}

/// Command-line interface of the `event-propagator` binary.
#[derive(Debug, Parser)]
#[command(name = "event-propagator", version, about)]
pub struct Cli {
	/// Action to perform; defaults to `run`.
	#[command(subcommand)]
	pub command: Option<Command>,
	/// Propagation settings.
	#[command(flatten)]
	pub config: EnvConfig,
	/// Tracing filter directives (e.g. `info,event_propagator=debug`).
	#[arg(long, env = "RUST_LOG")]
	pub log_filter: Option<String>,
	/// Number of recent deliveries summarised in the metrics log line.
	#[arg(long, env = "METRICS_WINDOW_SIZE", default_value_t = DEFAULT_WINDOW_SIZE)]
	pub metrics_window: usize,
}

/// Binary subcommands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Subcommand)]
pub enum Command {
	/// Propagate events until a termination signal arrives.
	#[default]
	Run,
	/// Validate the configuration and exit; intended for container health checks.
	Check,
}

/// Raw, unvalidated configuration values.
#[derive(Clone, Debug, Default, Args)]
pub struct EnvConfig {
	/// Seconds between events (positive number).
	#[arg(long, env = "PERIOD_IN_SECONDS")]
	pub period_in_seconds: Option<String>,
	/// HTTP endpoint that receives the events.
	#[arg(long, env = "HTTP_POST_ENDPOINT")]
	pub http_post_endpoint: Option<String>,
	/// JSON file holding a non-empty array of payload objects.
	#[arg(long, env = "PAYLOAD_FILE_PATH")]
	pub payload_file_path: Option<PathBuf>,
	/// Optional endpoint probed before propagation starts.
	#[arg(long, env = "HEALTH_CHECK_ENDPOINT")]
	pub health_check_endpoint: Option<String>,
}
impl EnvConfig {
	/// Validate the raw values and load the payload file.
	pub fn load(&self) -> Result<Settings> {
		let period_raw = required(self.period_in_seconds.as_deref(), "PERIOD_IN_SECONDS")?;
		let endpoint_raw = required(self.http_post_endpoint.as_deref(), "HTTP_POST_ENDPOINT")?;
		let payload_path = self
			.payload_file_path
			.as_deref()
			.filter(|path| !path.as_os_str().is_empty())
			.ok_or_else(|| missing("PAYLOAD_FILE_PATH"))?;
		let period = parse_period(period_raw)?;
		let target_url = parse_http_url("http_post_endpoint", endpoint_raw)?;
		let health_url = self
			.health_check_endpoint
			.as_deref()
			.map(str::trim)
			.filter(|raw| !raw.is_empty())
			.map(|raw| parse_http_url("health_check_endpoint", raw))
			.transpose()?;
		let payloads = load_payloads(payload_path)?;

		tracing::info!(
			?period,
			endpoint = %target_url,
			payloads = payloads.len(),
			health_check = health_url.as_ref().map_or("<disabled>", Url::as_str),
			"propagator configured"
		);

		Ok(Settings { period, target_url, payloads, health_url })
	}
}

/// Read and validate a payload file: a non-empty JSON array of objects.
pub fn load_payloads(path: &Path) -> Result<Vec<Payload>> {
	let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
		ErrorKind::NotFound => Error::Validation {
			field: "payload_file_path",
			reason: format!("Payload file not found: {}.", path.display()),
		},
		_ => Error::Io(err),
	})?;
	let document: Value = serde_json::from_str(&raw).map_err(|err| Error::Validation {
		field: "payload_file_path",
		reason: format!("Payload file contains invalid JSON ({}): {err}.", path.display()),
	})?;
	let Value::Array(items) = document else {
		return Err(Error::Validation {
			field: "payloads",
			reason: "Payload file must be a JSON array.".into(),
		});
	};

	if items.is_empty() {
		return Err(Error::Validation {
			field: "payloads",
			reason: "Payload file is empty.".into(),
		});
	}

	let payloads = items
		.into_iter()
		.map(|item| match item {
			Value::Object(object) => Ok(object),
			_ => Err(Error::Validation {
				field: "payloads",
				reason: "Each payload must be a JSON object.".into(),
			}),
		})
		.collect::<Result<Vec<_>>>()?;

	tracing::debug!(count = payloads.len(), path = %path.display(), "loaded payloads");

	Ok(payloads)
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
	value.map(str::trim).filter(|value| !value.is_empty()).ok_or_else(|| missing(name))
}

fn missing(name: &str) -> Error {
	Error::Config(format!("Missing required environment variable: {name}."))
}

fn parse_period(raw: &str) -> Result<Duration> {
	let invalid = || Error::Validation {
		field: "period_in_seconds",
		reason: format!("Must be a positive number of seconds (got: {raw})."),
	};
	let seconds: f64 = raw.parse().map_err(|_| invalid())?;

	if !seconds.is_finite() || seconds <= 0.0 {
		return Err(invalid());
	}

	Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}

fn parse_http_url(field: &'static str, raw: &str) -> Result<Url> {
	let url = Url::parse(raw)
		.map_err(|err| Error::Validation { field, reason: format!("Invalid URL {raw:?}: {err}.") })?;

	if !matches!(url.scheme(), "http" | "https") {
		return Err(Error::Validation {
			field,
			reason: format!("Only http:// and https:// endpoints are allowed (got: {}).", url.scheme()),
		});
	}
	if url.host_str().is_none() {
		return Err(Error::Validation { field, reason: "Must include a host component.".into() });
	}

	Ok(url)
}
