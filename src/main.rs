//! `event-propagator` binary: propagate events until a termination signal arrives.

// std
use std::process::ExitCode;
// crates.io
use clap::Parser;
use event_propagator::{Cli, Command, ServiceOptions, logging, service, signal};

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	if let Err(err) = logging::init(cli.log_filter.as_deref()) {
		eprintln!("{err}");

		return ExitCode::FAILURE;
	}

	let settings = match cli.config.load() {
		Ok(settings) => settings,
		Err(err) => {
			tracing::error!(
				error = %err,
				"invalid configuration; check PERIOD_IN_SECONDS, HTTP_POST_ENDPOINT, PAYLOAD_FILE_PATH and that the payload file holds a JSON array"
			);

			return ExitCode::FAILURE;
		},
	};

	if cli.command.unwrap_or_default() == Command::Check {
		tracing::info!("configuration is valid");

		return ExitCode::SUCCESS;
	}

	#[cfg(feature = "prometheus")]
	if let Err(err) = event_propagator::metrics::install_default_exporter() {
		tracing::warn!(error = %err, "prometheus exporter unavailable");
	}

	let options = ServiceOptions { window_size: cli.metrics_window, ..Default::default() };
	let stop = signal::shutdown_token();

	match service::run(settings, options, &stop).await {
		Ok(report) => {
			tracing::info!(
				ticks = report.ticks,
				delivered = report.delivered,
				failed = report.failed,
				cancelled = report.cancelled,
				"shutdown complete"
			);

			ExitCode::SUCCESS
		},
		Err(err) => {
			tracing::error!(error = %err, "event propagator stopped with an error");

			ExitCode::FAILURE
		},
	}
}
