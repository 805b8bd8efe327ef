//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the event propagator crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Http(#[from] http::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Logging error: {0}")]
	Logging(String),
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Scheduler fault: {0}")]
	Scheduler(String),
	#[error("Health check failed for {url}")]
	Unhealthy { url: url::Url },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// Whether the consumer could not be reached at all (connection refused, DNS, socket).
	pub fn is_unreachable(&self) -> bool {
		match self {
			Error::Reqwest(err) => err.is_connect(),
			Error::Io(_) => true,
			_ => false,
		}
	}
}
