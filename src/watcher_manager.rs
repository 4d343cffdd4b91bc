//! Subscribes to the [`Registry`]'s watch/unwatch fan-out and owns one [`Watcher`] per replica
//! (§4.4).

use std::{collections::HashMap, path::PathBuf, sync::Arc, sync::Mutex};

use tracing::{debug, warn};

use crate::{
	registry::{Registry, Replica},
	watcher::{Watcher, WatcherFactory},
};

/// Creates and destroys a native [`Watcher`] per replica, as the [`Registry`] adds and removes
/// them.
///
/// Construction failures of a `Watcher` are logged and swallowed (§4.4): the replica stays
/// registered in the `Registry`, but no events will flow for it.
pub struct WatcherManager {
	watchers: Mutex<HashMap<String, Box<dyn Watcher>>>,
}

impl WatcherManager {
	/// Subscribe `on_watch`/`on_unwatch` on `registry` and return the manager that will react to
	/// them. `factory` is used to create one watcher per replica, `sink` receives absolute changed
	/// paths tagged with the originating replica so the caller can route them back into the
	/// registry.
	pub fn new(
		registry: Arc<Registry>,
		factory: Arc<dyn WatcherFactory>,
		on_events: impl Fn(&Replica, Vec<PathBuf>) + Send + Sync + 'static,
	) -> Arc<Self> {
		let manager = Arc::new(Self {
			watchers: Mutex::new(HashMap::new()),
		});

		let on_events = Arc::new(on_events);

		{
			let manager = manager.clone();
			let factory = factory.clone();
			let on_events = on_events.clone();
			registry.on_watch(move |replica: &Replica| {
				manager.start_watching(replica, factory.as_ref(), on_events.clone());
			});
		}

		{
			let manager = manager.clone();
			registry.on_unwatch(move |replica: &Replica| {
				manager.stop_watching(&replica.hash);
			});
		}

		manager
	}

	fn start_watching(
		&self,
		replica: &Replica,
		factory: &dyn WatcherFactory,
		on_events: Arc<dyn Fn(&Replica, Vec<PathBuf>) + Send + Sync>,
	) {
		let mut watchers = self.watchers.lock().expect("watcher map poisoned");
		if watchers.contains_key(&replica.hash) {
			return;
		}

		let replica = replica.clone();
		let sink_replica = replica.clone();
		let mut watcher = factory.create(
			&replica.fspath,
			Arc::new(move |paths| on_events(&sink_replica, paths)),
		);

		match watcher.start() {
			Ok(()) => {
				debug!(hash = %replica.hash, fspath = %replica.fspath.display(), "watcher started");
				watchers.insert(replica.hash.clone(), watcher);
			}
			Err(err) => {
				warn!(hash = %replica.hash, %err, "watcher failed to start; replica will stay silent");
			}
		}
	}

	fn stop_watching(&self, hash: &str) {
		// Stopped watchers are retained (not removed) so repeated start/stop stays idempotent,
		// per §4.4.
		let mut watchers = self.watchers.lock().expect("watcher map poisoned");
		if let Some(watcher) = watchers.get_mut(hash) {
			watcher.stop();
			debug!(hash, "watcher stopped");
		}
	}

	/// Stop every watcher. Called on process shutdown.
	pub fn stop_all(&self) {
		for (hash, watcher) in self.watchers.lock().expect("watcher map poisoned").iter_mut() {
			watcher.stop();
			debug!(hash, "watcher stopped at shutdown");
		}
	}

	/// Whether a watcher is registered and currently running for `hash`. Exposed for tests.
	#[cfg(test)]
	pub fn is_running(&self, hash: &str) -> bool {
		self.watchers
			.lock()
			.expect("watcher map poisoned")
			.get(hash)
			.map(|w| w.is_running())
			.unwrap_or(false)
	}
}
