//! The replica registry (§4.3): owns known replicas and their change trees, and fans out
//! watch/unwatch/change notifications to subscribers.

use std::{
	collections::{BTreeSet, HashMap},
	path::{Path, PathBuf},
	sync::Mutex,
};

use tracing::{debug, trace};

use crate::{change_tree::ChangeTree, error::RuntimeError};

/// A rooted directory tree the parent has asked to be watched, identified by an opaque hash.
#[derive(Debug, Clone)]
pub struct Replica {
	/// Opaque stable identifier chosen by the parent; compared by exact byte/string equality.
	pub hash: String,

	/// The absolute local root of the replica.
	pub fspath: PathBuf,

	/// Sub-paths the parent has declared interest in. Informational: the watcher always covers
	/// the entire `fspath` regardless of this set's contents.
	pub paths: BTreeSet<String>,
}

impl Replica {
	/// A new replica with an optional initial sub-path (mirrors the `START hash fspath [path]`
	/// wire command).
	pub fn new(hash: impl Into<String>, fspath: impl Into<PathBuf>, path: Option<String>) -> Self {
		let mut paths = BTreeSet::new();
		if let Some(p) = path {
			paths.insert(p);
		}
		Self {
			hash: hash.into(),
			fspath: fspath.into(),
			paths,
		}
	}

	fn merge(&mut self, other: &Replica) {
		self.paths.extend(other.paths.iter().cloned());
	}
}

type WatchListener = Box<dyn Fn(&Replica) + Send + Sync>;
type ChangeListener = Box<dyn Fn(&str) + Send + Sync>;

/// Owns `replicas` and `trees` exclusively; all reads and writes to them pass through this type.
#[derive(Default)]
pub struct Registry {
	replicas: Mutex<HashMap<String, Replica>>,
	trees: Mutex<HashMap<String, ChangeTree>>,

	on_watch: Mutex<Vec<WatchListener>>,
	on_unwatch: Mutex<Vec<WatchListener>>,
	on_change: Mutex<Vec<ChangeListener>>,
}

impl Registry {
	/// A registry with no replicas and no subscribers.
	pub fn new() -> Self {
		Self::default()
	}

	/// Subscribe to be called synchronously whenever a new replica is first added.
	pub fn on_watch(&self, listener: impl Fn(&Replica) + Send + Sync + 'static) {
		self.on_watch.lock().expect("on_watch lock poisoned").push(Box::new(listener));
	}

	/// Subscribe to be called whenever a replica is unwatched.
	///
	/// Nothing in the current protocol triggers this: `RESET` only discards pending change
	/// information and does not stop the watcher (§4.5). The hook exists for symmetry with
	/// `on_watch` and for implementations that add their own teardown command.
	pub fn on_unwatch(&self, listener: impl Fn(&Replica) + Send + Sync + 'static) {
		self.on_unwatch
			.lock()
			.expect("on_unwatch lock poisoned")
			.push(Box::new(listener));
	}

	/// Subscribe to be called whenever a replica's change tree gains a change.
	pub fn on_change(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
		self.on_change
			.lock()
			.expect("on_change lock poisoned")
			.push(Box::new(listener));
	}

	/// Register `replica`. If its hash is new, inserts it and invokes every `on_watch` listener
	/// with the new replica. If a replica with the same hash already exists, merges `paths` into
	/// it and invokes no listeners.
	pub fn add_replica(&self, replica: Replica) {
		let newly_inserted = {
			let mut replicas = self.replicas.lock().expect("replicas lock poisoned");
			match replicas.get_mut(&replica.hash) {
				Some(existing) => {
					existing.merge(&replica);
					None
				}
				None => {
					replicas.insert(replica.hash.clone(), replica.clone());
					Some(replica)
				}
			}
		};

		if let Some(replica) = newly_inserted {
			debug!(hash = %replica.hash, fspath = %replica.fspath.display(), "registering new replica");
			for listener in self.on_watch.lock().expect("on_watch lock poisoned").iter() {
				listener(&replica);
			}
		} else {
			trace!(hash = %replica.hash, "merged paths into existing replica");
		}
	}

	/// Whether a replica with this hash is registered.
	pub fn has_replica(&self, hash: &str) -> bool {
		self.replicas.lock().expect("replicas lock poisoned").contains_key(hash)
	}

	/// Look up a replica by hash.
	pub fn replica(&self, hash: &str) -> Result<Replica, RuntimeError> {
		self.replicas
			.lock()
			.expect("replicas lock poisoned")
			.get(hash)
			.cloned()
			.ok_or_else(|| RuntimeError::NotFound { hash: hash.to_string() })
	}

	/// Record a batch of absolute filesystem event paths against `replica`'s change tree, then
	/// invoke every `on_change` listener with its hash.
	///
	/// The tree lock is released before any listener runs.
	pub fn push_fs_events(&self, replica: &Replica, events: impl IntoIterator<Item = PathBuf>) {
		{
			let mut trees = self.trees.lock().expect("trees lock poisoned");
			let tree = trees.entry(replica.hash.clone()).or_default();

			for path in events {
				match relative_components(&path, &replica.fspath) {
					Some(components) => tree.record(components),
					None => {
						trace!(path = %path.display(), fspath = %replica.fspath.display(), "event path outside replica root, ignoring");
					}
				}
			}
		}

		trace!(hash = %replica.hash, "notifying change listeners");
		for listener in self.on_change.lock().expect("on_change lock poisoned").iter() {
			listener(&replica.hash);
		}
	}

	/// Atomically take ownership of the change tree for `hash`, leaving an empty tree behind.
	pub fn consume_directory(&self, hash: &str) -> ChangeTree {
		let mut trees = self.trees.lock().expect("trees lock poisoned");
		trees.insert(hash.to_string(), ChangeTree::new()).unwrap_or_default()
	}

	/// Discard the pending change tree for `hash` without returning it. Equivalent to
	/// `consume_directory` with the result dropped (the documented `RESET` contract, see §9).
	pub fn discard_directory(&self, hash: &str) {
		self.trees.lock().expect("trees lock poisoned").insert(hash.to_string(), ChangeTree::new());
	}

	/// The subset of `interested` hashes whose change tree currently reports changes.
	pub fn changed_replicas(&self, interested: &[String]) -> Vec<String> {
		let trees = self.trees.lock().expect("trees lock poisoned");
		interested
			.iter()
			.filter(|hash| trees.get(hash.as_str()).is_some_and(|t| !t.is_empty()))
			.cloned()
			.collect()
	}
}

/// The components of `path` relative to `root`, or `None` if `path` is not under `root`.
///
/// An empty vector means `path` is exactly `root` (the replica root itself changed).
fn relative_components(path: &Path, root: &Path) -> Option<Vec<String>> {
	let relative = path.strip_prefix(root).ok()?;
	Some(
		relative
			.components()
			.map(|c| c.as_os_str().to_string_lossy().into_owned())
			.collect(),
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::{Arc, Mutex as StdMutex};

	#[test]
	fn add_replica_invokes_on_watch_once() {
		let registry = Registry::new();
		let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
		let seen2 = seen.clone();
		registry.on_watch(move |r| seen2.lock().unwrap().push(r.hash.clone()));

		registry.add_replica(Replica::new("r1", "/tmp/r1", None));
		registry.add_replica(Replica::new("r1", "/tmp/r1", Some("sub".into())));

		assert_eq!(*seen.lock().unwrap(), vec!["r1".to_string()]);
		assert!(registry.replica("r1").unwrap().paths.contains("sub"));
	}

	#[test]
	fn unknown_hash_is_not_found() {
		let registry = Registry::new();
		assert!(!registry.has_replica("nope"));
		assert!(matches!(registry.replica("nope"), Err(RuntimeError::NotFound { .. })));
	}

	#[test]
	fn push_and_consume_round_trips() {
		let registry = Registry::new();
		let replica = Replica::new("r1", "/tmp/r1", None);
		registry.add_replica(replica.clone());

		registry.push_fs_events(&replica, vec![PathBuf::from("/tmp/r1/a/b")]);
		assert_eq!(registry.changed_replicas(&["r1".to_string()]), vec!["r1".to_string()]);

		let tree = registry.consume_directory("r1");
		assert_eq!(tree.compact(), vec!["a/b"]);
		assert!(registry.changed_replicas(&["r1".to_string()]).is_empty());
	}

	#[test]
	fn reset_discards_without_returning() {
		let registry = Registry::new();
		let replica = Replica::new("r1", "/tmp/r1", None);
		registry.add_replica(replica.clone());
		registry.push_fs_events(&replica, vec![PathBuf::from("/tmp/r1/a")]);

		registry.discard_directory("r1");
		assert!(registry.changed_replicas(&["r1".to_string()]).is_empty());
	}

	#[test]
	fn on_change_fires_after_event_recorded() {
		let registry = Registry::new();
		let replica = Replica::new("r1", "/tmp/r1", None);
		registry.add_replica(replica.clone());

		let fired: Arc<StdMutex<bool>> = Arc::new(StdMutex::new(false));
		let fired2 = fired.clone();
		registry.on_change(move |_hash| *fired2.lock().unwrap() = true);

		registry.push_fs_events(&replica, vec![PathBuf::from("/tmp/r1/a")]);
		assert!(*fired.lock().unwrap());
	}
}
