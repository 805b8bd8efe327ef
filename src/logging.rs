//! Tracing subscriber setup for the binary.

// crates.io
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
// self
use crate::_prelude::*;

/// Directives used when neither a filter argument nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info,event_propagator=debug,reqwest=warn,hyper=warn,hyper_util=warn";

/// Install the global subscriber.
///
/// `filter` takes precedence over the environment; malformed directives are rejected rather than
/// silently replaced. Fails if a global subscriber is already installed.
pub fn init(filter: Option<&str>) -> Result<()> {
	let filter = match filter.map(str::trim).filter(|directives| !directives.is_empty()) {
		Some(directives) => EnvFilter::try_new(directives)
			.map_err(|err| Error::Logging(format!("Invalid filter {directives:?}: {err}.")))?,
		None => EnvFilter::try_from_default_env()
			.or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
			.map_err(|err| Error::Logging(err.to_string()))?,
	};
	let fmt_layer = fmt::layer().with_target(true).with_line_number(true);

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer)
		.try_init()
		.map_err(|err| Error::Logging(err.to_string()))
}
