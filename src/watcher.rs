//! The abstract watcher contract (§4.2) and its concrete backends.
//!
//! The core depends only on [`Watcher`]/[`WatcherFactory`]; the `notify` crate is an
//! implementation detail confined to [`NotifyWatcherFactory`]. A [`fake::FakeWatcherFactory`] test
//! double lets the rest of the system be exercised without touching a real filesystem, per the
//! "Watcher as trait/interface" note in §9.

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use normalize_path::NormalizePath;
use tracing::{debug, trace, warn};

use crate::error::RuntimeError;

/// A batch of absolute paths observed to have changed, handed to the sink that created the
/// watcher.
pub type EventSink = Arc<dyn Fn(Vec<PathBuf>) + Send + Sync>;

/// Observes one filesystem root and reports changed paths to its sink until stopped.
///
/// Implementations are created already bound to a root and a sink (see [`WatcherFactory`]); once
/// created, [`start`](Watcher::start) may be called at most meaningfully once, but
/// [`stop`](Watcher::stop) must be idempotent.
pub trait Watcher: Send {
	/// Begin producing events. Returns once events will be delivered.
	fn start(&mut self) -> Result<(), RuntimeError>;

	/// Stop producing events. Idempotent.
	fn stop(&mut self);

	/// The last observed running state.
	fn is_running(&self) -> bool;
}

/// Creates a [`Watcher`] bound to a root and a sink.
///
/// This indirection exists so the [`WatcherManager`](crate::watcher_manager::WatcherManager) can
/// hold a single factory and produce one watcher per replica, and so tests can swap in
/// [`fake::FakeWatcherFactory`] without touching the rest of the system.
pub trait WatcherFactory: Send + Sync {
	/// Construct (but do not start) a watcher for `root`, delivering batches to `sink`.
	fn create(&self, root: &Path, sink: EventSink) -> Box<dyn Watcher>;
}

/// Excludes version-control metadata directories by a simple path-segment filter, per §4.2's
/// convention ("by convention, version-control metadata directories (.git, .hg) are excluded").
fn is_vcs_metadata(path: &Path) -> bool {
	path.components().any(|c| {
		let s = c.as_os_str();
		s == ".git" || s == ".hg"
	})
}

/// The production watcher backend, built on the `notify` crate's platform-recommended
/// implementation (inotify/FSEvents/kqueue, or a polling fallback where none is available).
pub struct NotifyWatcher {
	root: PathBuf,
	sink: EventSink,
	inner: Option<notify::RecommendedWatcher>,
	running: bool,
}

impl NotifyWatcher {
	fn new(root: PathBuf, sink: EventSink) -> Self {
		Self {
			root,
			sink,
			inner: None,
			running: false,
		}
	}
}

impl Watcher for NotifyWatcher {
	fn start(&mut self) -> Result<(), RuntimeError> {
		use notify::Watcher as _;

		if self.running {
			return Ok(());
		}

		let sink = self.sink.clone();
		let root_display = self.root.display().to_string();
		let mut watcher = notify::RecommendedWatcher::new(
			move |result: Result<notify::Event, notify::Error>| match result {
				Ok(event) => {
					let paths: Vec<PathBuf> = event
						.paths
						.into_iter()
						.map(|p| p.normalize())
						.filter(|p| !is_vcs_metadata(p))
						.collect();
					if !paths.is_empty() {
						trace!(?paths, "fs watcher observed change");
						(sink)(paths);
					}
				}
				Err(err) => warn!(%err, "fs watcher reported an error"),
			},
			notify::Config::default(),
		)
		.map_err(|err| RuntimeError::WatcherStart {
			fspath: root_display.clone(),
			err,
		})?;

		watcher
			.watch(&self.root, notify::RecursiveMode::Recursive)
			.map_err(|err| RuntimeError::WatcherStart {
				fspath: root_display,
				err,
			})?;

		debug!(root = %self.root.display(), "started fs watcher");
		self.inner = Some(watcher);
		self.running = true;
		Ok(())
	}

	fn stop(&mut self) {
		if let Some(mut watcher) = self.inner.take() {
			use notify::Watcher as _;
			if let Err(err) = watcher.unwatch(&self.root) {
				warn!(%err, root = %self.root.display(), "error unwatching replica root");
			}
			debug!(root = %self.root.display(), "stopped fs watcher");
		}
		self.running = false;
	}

	fn is_running(&self) -> bool {
		self.running
	}
}

/// Builds [`NotifyWatcher`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyWatcherFactory;

impl WatcherFactory for NotifyWatcherFactory {
	fn create(&self, root: &Path, sink: EventSink) -> Box<dyn Watcher> {
		Box::new(NotifyWatcher::new(root.to_path_buf(), sink))
	}
}

/// A test double standing in for a real filesystem, used in unit and integration tests.
pub mod fake {
	use std::{
		path::{Path, PathBuf},
		sync::{Arc, Mutex},
	};

	use super::{EventSink, Watcher, WatcherFactory};

	struct Inner {
		sink: EventSink,
		running: bool,
	}

	/// A [`Watcher`] controlled entirely by the test: no thread, no real filesystem, events are
	/// delivered only when [`FakeWatcherFactory::emit`] is called.
	pub struct FakeWatcher {
		shared: Arc<Mutex<Inner>>,
	}

	impl Watcher for FakeWatcher {
		fn start(&mut self) -> Result<(), crate::error::RuntimeError> {
			self.shared.lock().expect("fake watcher lock poisoned").running = true;
			Ok(())
		}

		fn stop(&mut self) {
			self.shared.lock().expect("fake watcher lock poisoned").running = false;
		}

		fn is_running(&self) -> bool {
			self.shared.lock().expect("fake watcher lock poisoned").running
		}
	}

	/// Creates [`FakeWatcher`]s and lets the test push events into any of them by root path.
	#[derive(Clone, Default)]
	pub struct FakeWatcherFactory {
		watchers: Arc<Mutex<std::collections::HashMap<PathBuf, Arc<Mutex<Inner>>>>>,
	}

	impl FakeWatcherFactory {
		/// A fresh factory with no watchers yet.
		pub fn new() -> Self {
			Self::default()
		}

		/// Deliver `paths` to the sink of the watcher bound to `root`, if one was created and is
		/// running. No-op if no watcher was ever created for `root`, or if it is stopped.
		pub fn emit(&self, root: &Path, paths: Vec<PathBuf>) {
			let watchers = self.watchers.lock().expect("fake watcher map poisoned");
			if let Some(shared) = watchers.get(root) {
				let (sink, running) = {
					let inner = shared.lock().expect("fake watcher lock poisoned");
					(inner.sink.clone(), inner.running)
				};
				if running {
					(sink)(paths);
				}
			}
		}

		/// Whether a watcher was ever created for `root` and is currently running.
		pub fn is_running(&self, root: &Path) -> bool {
			let watchers = self.watchers.lock().expect("fake watcher map poisoned");
			watchers
				.get(root)
				.map(|shared| shared.lock().expect("fake watcher lock poisoned").running)
				.unwrap_or(false)
		}
	}

	impl WatcherFactory for FakeWatcherFactory {
		fn create(&self, root: &Path, sink: EventSink) -> Box<dyn Watcher> {
			let shared = Arc::new(Mutex::new(Inner {
				sink,
				running: false,
			}));
			self.watchers
				.lock()
				.expect("fake watcher map poisoned")
				.insert(root.to_path_buf(), shared.clone());
			Box::new(FakeWatcher { shared })
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::path::PathBuf;

	#[test]
	fn vcs_metadata_is_excluded() {
		assert!(is_vcs_metadata(Path::new("/tmp/r1/.git/HEAD")));
		assert!(is_vcs_metadata(Path::new("/tmp/r1/.hg/store")));
		assert!(!is_vcs_metadata(Path::new("/tmp/r1/a/b")));
	}

	#[test]
	fn fake_watcher_only_delivers_while_running() {
		let factory = fake::FakeWatcherFactory::new();
		let root = PathBuf::from("/tmp/r1");
		let seen: Arc<std::sync::Mutex<Vec<PathBuf>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
		let sink_seen = seen.clone();
		let mut watcher = factory.create(
			&root,
			Arc::new(move |paths| sink_seen.lock().unwrap().extend(paths)),
		);

		factory.emit(&root, vec![root.join("a")]);
		assert!(seen.lock().unwrap().is_empty(), "not started yet");

		watcher.start().unwrap();
		factory.emit(&root, vec![root.join("a")]);
		assert_eq!(seen.lock().unwrap().len(), 1);

		watcher.stop();
		watcher.stop(); // idempotent
		factory.emit(&root, vec![root.join("b")]);
		assert_eq!(seen.lock().unwrap().len(), 1, "stopped watcher delivers nothing");
	}
}
