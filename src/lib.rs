//! Drift-free periodic HTTP event propagator.
//!
//! A [`Scheduler`] fires one POST per period at a consumer endpoint, picking a payload at random
//! each tick. Deliveries run as independent, cancellable units so a slow consumer never shifts the
//! schedule; transient transport failures are retried under a bounded [`RetryPolicy`], and every
//! outcome feeds a sliding [`WindowMetrics`] summary.
//!
//! ```no_run
//! use event_propagator::{ServiceOptions, Settings, service};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(settings: Settings) -> event_propagator::Result<()> {
//! let stop = CancellationToken::new();
//! let report = service::run(settings, ServiceOptions::default(), &stop).await?;
//!
//! println!("issued {} ticks", report.ticks);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod config;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod signal;

mod error;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

pub use crate::{
	config::{Cli, Command, EnvConfig, Payload, Settings},
	error::{Error, Result},
	http::{
		client::{ClientConfig, DeliveryRequest, HttpClient},
		retry::{RetryPolicy, Transient, retry},
	},
	metrics::{AttemptOutcome, MetricsSink, MetricsSummary, NoopMetrics, WindowMetrics},
	scheduler::{
		runner::{Dispatch, Scheduler},
		state::{RunReport, SchedulerState},
	},
	service::ServiceOptions,
	signal::{StopSignal, stop_when},
};
