//! Stop predicates observed by the scheduler, plus OS signal plumbing.
//!
//! The scheduler polls [`StopSignal::should_stop`] at every iteration boundary and races its
//! per-tick sleep against [`StopSignal::stopped`], so a stop request wakes it promptly without
//! interrupting an iteration halfway.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`, and Ctrl-C.
//!
//! **Other platforms:** Ctrl-C via [`tokio::signal::ctrl_c`].

// std
use std::{
	future::{self, Future},
	io,
	sync::atomic::{AtomicBool, Ordering},
};
// crates.io
use tokio_util::sync::CancellationToken;
// self
use crate::_prelude::*;

/// External "should stop" flag shared with the scheduler.
pub trait StopSignal: Send + Sync {
	/// Whether a stop has been requested.
	fn should_stop(&self) -> bool;

	/// Resolves once a stop has been requested.
	///
	/// The default never resolves; such signals are only observed between ticks.
	fn stopped(&self) -> impl Future<Output = ()> + Send {
		future::pending()
	}
}
impl StopSignal for CancellationToken {
	fn should_stop(&self) -> bool {
		self.is_cancelled()
	}

	fn stopped(&self) -> impl Future<Output = ()> + Send {
		self.cancelled()
	}
}
impl StopSignal for AtomicBool {
	fn should_stop(&self) -> bool {
		self.load(Ordering::Acquire)
	}
}
impl<T> StopSignal for &T
where
	T: ?Sized + StopSignal,
{
	fn should_stop(&self) -> bool {
		(**self).should_stop()
	}

	fn stopped(&self) -> impl Future<Output = ()> + Send {
		(**self).stopped()
	}
}
impl<T> StopSignal for Arc<T>
where
	T: ?Sized + StopSignal,
{
	fn should_stop(&self) -> bool {
		(**self).should_stop()
	}

	fn stopped(&self) -> impl Future<Output = ()> + Send {
		(**self).stopped()
	}
}

/// Predicate-backed stop signal; see [`stop_when`].
#[derive(Clone, Copy, Debug)]
pub struct StopWhen<F>(F);
impl<F> StopSignal for StopWhen<F>
where
	F: Fn() -> bool + Send + Sync,
{
	fn should_stop(&self) -> bool {
		(self.0)()
	}
}

/// Adapt a closure into a [`StopSignal`].
pub fn stop_when<F>(predicate: F) -> StopWhen<F>
where
	F: Fn() -> bool + Send + Sync,
{
	StopWhen(predicate)
}

/// Wait for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if listener registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
	// crates.io
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigint = signal(SignalKind::interrupt())?;
	let mut sigterm = signal(SignalKind::terminate())?;
	let mut sigquit = signal(SignalKind::quit())?;

	tokio::select! {
		_ = tokio::signal::ctrl_c() => {},
		_ = sigint.recv() => {},
		_ = sigterm.recv() => {},
		_ = sigquit.recv() => {},
	}

	Ok(())
}

/// Wait for a termination signal.
///
/// Returns `Ok(())` when Ctrl-C is received, or `Err` if listener registration fails.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
	tokio::signal::ctrl_c().await
}

/// Token cancelled by the first termination signal.
///
/// Must be called from within a Tokio runtime.
pub fn shutdown_token() -> CancellationToken {
	let token = CancellationToken::new();
	let trigger = token.clone();

	tokio::spawn(async move {
		match wait_for_shutdown_signal().await {
			Ok(()) => tracing::info!("termination signal received, initiating graceful shutdown"),
			Err(err) => tracing::error!(error = %err, "failed to listen for termination signals"),
		}

		trigger.cancel();
	});

	token
}
