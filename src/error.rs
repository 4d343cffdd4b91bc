//! Error types for the filesystem monitor.
//!
//! Mirrors the split used throughout watchexec: a [`RuntimeError`] for per-operation failures that
//! are logged and swallowed at the boundary that produced them, and a [`CriticalError`] for the
//! small number of failures that should stop the process.

use miette::Diagnostic;
use thiserror::Error;

/// Errors which are recoverable or only affect a single operation.
///
/// None of these propagate across the replica/watcher boundary: the component that produces one
/// logs it and continues, per §7 of the design.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum RuntimeError {
	/// A replica or change tree lookup by hash found nothing.
	///
	/// Treated as a programming error on the parent's side; the child emits no change information
	/// and proceeds.
	#[error("no replica registered with hash {hash:?}")]
	#[diagnostic(code(fsmonitor::runtime::not_found))]
	NotFound {
		/// The hash that failed to resolve.
		hash: String,
	},

	/// A native watcher failed to initialise for a replica.
	///
	/// The replica remains registered but silent: no events will ever flow for it.
	#[error("watcher failed to start for {fspath}: {err}")]
	#[diagnostic(code(fsmonitor::runtime::watcher_start))]
	WatcherStart {
		/// The replica root the watcher was bound to.
		fspath: String,

		/// The underlying notify error.
		#[source]
		err: notify::Error,
	},

	/// A command line could not be tokenized into a known command.
	///
	/// Skipped silently by the protocol driver.
	#[error("malformed command line: {0:?}")]
	#[diagnostic(code(fsmonitor::runtime::malformed))]
	Malformed(String),
}

/// Errors which are not recoverable and stop the process.
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum CriticalError {
	/// Standard input reached end-of-file or became unreadable.
	///
	/// This terminates the main loop cleanly (exit code 0), it is not a failure by itself, but is
	/// modeled here so that the main loop has a single `Result` to return.
	#[error("stdin closed")]
	#[diagnostic(code(fsmonitor::critical::io_end))]
	IoEnd,

	/// A critical I/O error occurred (other than stdin EOF).
	#[error("io({about}): {err}")]
	#[diagnostic(code(fsmonitor::critical::io_error))]
	IoError {
		/// What the I/O was about.
		about: &'static str,

		/// The underlying error.
		#[source]
		err: std::io::Error,
	},

	/// The structured logging subscriber failed to install.
	#[error("failed to install tracing subscriber: {0}")]
	#[diagnostic(code(fsmonitor::critical::logging_init))]
	LoggingInit(String),
}
