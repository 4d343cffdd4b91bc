//! Structured logging setup (§2.1), following the same verbosity-to-filter mapping and optional
//! log-file writer the teacher's CLI uses.

use std::{fs::OpenOptions, sync::Mutex};

use tracing_subscriber::EnvFilter;

use fsmonitor::error::CriticalError;

use crate::args::Args;

/// Install the global tracing subscriber based on `args`.
///
/// `RUST_LOG`, if set, takes precedence over the verbosity-derived filter, matching the teacher's
/// convention of letting an explicit environment override win.
pub fn init(args: &Args) -> Result<(), CriticalError> {
	let filter = std::env::var("RUST_LOG").ok().map(EnvFilter::new).unwrap_or_else(|| {
		EnvFilter::new(match args.verbose {
			0 => "fsmonitor=warn",
			1 => "fsmonitor=debug",
			_ => "fsmonitor=trace",
		})
	});

	let builder = tracing_subscriber::fmt().with_env_filter(filter);

	let result = if cfg!(feature = "debug") {
		if let Some(path) = &args.log_file {
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.map_err(|err| CriticalError::IoError { about: "opening log file", err })?;
			builder.json().with_writer(Mutex::new(file)).try_init()
		} else {
			builder.try_init()
		}
	} else {
		builder.try_init()
	};

	result.map_err(|err| CriticalError::LoggingInit(err.to_string()))
}
