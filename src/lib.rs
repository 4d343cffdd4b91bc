//! A long-running child process that watches replica filesystem trees on behalf of a
//! synchronization driver and reports accumulated changes over a line protocol.
//!
//! The core pieces, leaves first:
//!
//! - [`change_tree`] — the per-replica trie that compacts many change notifications into a
//!   minimal recursive cover.
//! - [`watcher`] — the abstract per-replica filesystem observer and its backends.
//! - [`registry`] — the set of known replicas and their change trees, with watch/change fan-out.
//! - [`watcher_manager`] — starts and stops a [`watcher::Watcher`] per replica as the
//!   [`registry::Registry`] adds them.
//! - [`protocol`] — the line-oriented command loop spoken with the parent process.
//! - [`codec`] — percent-encoding and tokenization of wire tokens.

#![warn(clippy::unwrap_used)]

pub mod change_tree;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod watcher;
pub mod watcher_manager;

pub use change_tree::ChangeTree;
pub use protocol::ProtocolDriver;
pub use registry::{Registry, Replica};
pub use watcher_manager::WatcherManager;
