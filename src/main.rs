//! Process entry point: wires the [`Registry`], [`WatcherManager`], and [`ProtocolDriver`]
//! together against real stdin/stdout (§4.7).

use std::{
	io::{stdin, stdout, BufReader},
	process::ExitCode,
	sync::Arc,
};

use tracing::{error, info};

use fsmonitor::{
	error::CriticalError,
	watcher::NotifyWatcherFactory,
	watcher_manager::WatcherManager,
	ProtocolDriver, Registry,
};

mod args;
mod logging;

use args::Args;

fn main() -> ExitCode {
	let args = Args::parse_from_env();

	if let Err(err) = logging::init(&args) {
		eprintln!("fsmonitor: failed to initialise logging: {err}");
		return ExitCode::FAILURE;
	}

	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(CriticalError::IoEnd) => {
			info!("stdin closed, exiting normally");
			ExitCode::SUCCESS
		}
		Err(err) => {
			error!(%err, "fatal error");
			ExitCode::FAILURE
		}
	}
}

fn run() -> Result<(), CriticalError> {
	let registry = Arc::new(Registry::new());
	let factory = Arc::new(NotifyWatcherFactory);

	let watch_registry = registry.clone();
	let manager = WatcherManager::new(registry.clone(), factory, move |replica, paths| {
		watch_registry.push_fs_events(replica, paths);
	});

	let driver = ProtocolDriver::new(registry, stdout());
	let result = driver.run(BufReader::new(stdin()));

	manager.stop_all();
	result
}
