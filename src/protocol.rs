//! The protocol driver (§4.5): a single-threaded line-oriented state machine reading commands
//! from the parent and writing responses, plus the `WAIT`/`CHANGES` rendezvous.

use std::{
	collections::BTreeSet,
	io::{BufRead, Write},
	sync::{Arc, Mutex},
};

use tracing::{debug, trace, warn};

use crate::{
	change_tree::ChangeTree,
	codec::{encode, tokenize},
	error::{CriticalError, RuntimeError},
	registry::{Registry, Replica},
};

/// The set of replica hashes the parent is currently blocked on via `WAIT`, and the mutex
/// serializing access to it.
///
/// Shared between the main thread (reading commands) and every watcher thread (whose `on_change`
/// notification may need to resolve a pending wait), per §5.
struct WaitingSet {
	hashes: Mutex<BTreeSet<String>>,
}

impl WaitingSet {
	fn new() -> Self {
		Self {
			hashes: Mutex::new(BTreeSet::new()),
		}
	}

	fn insert(&self, hash: &str) {
		self.hashes.lock().expect("waiting lock poisoned").insert(hash.to_string());
	}

	fn contains(&self, hash: &str) -> bool {
		self.hashes.lock().expect("waiting lock poisoned").contains(hash)
	}

	fn take(&self) -> Vec<String> {
		std::mem::take(&mut *self.hashes.lock().expect("waiting lock poisoned"))
			.into_iter()
			.collect()
	}

	fn clear(&self) {
		self.hashes.lock().expect("waiting lock poisoned").clear();
	}
}

/// Writes response lines to the parent, serializing writers so that the driver's own responses
/// and an asynchronous wait-resolution from a watcher thread never interleave (§5).
struct Output<W: Write> {
	stdout: Mutex<W>,
}

impl<W: Write> Output<W> {
	fn new(writer: W) -> Self {
		Self {
			stdout: Mutex::new(writer),
		}
	}

	fn send(&self, command: &str, args: &[String]) -> std::io::Result<()> {
		let mut line = command.to_string();
		for arg in args {
			line.push(' ');
			line.push_str(&encode(arg));
		}
		trace!(%line, "<<< sent");

		let mut out = self.stdout.lock().expect("stdout lock poisoned");
		writeln!(out, "{line}")?;
		out.flush()
	}

	fn ack(&self) -> std::io::Result<()> {
		self.send("OK", &[])
	}
}

/// Reads command lines from the parent and dispatches them, writing responses to `stdout`.
///
/// Owns the `waiting` set (§4.5/§5). The `Registry`'s `on_change` listener is wired up at
/// construction so that a change arriving while replicas are awaited resolves the rendezvous
/// directly from the watcher thread that observed it.
pub struct ProtocolDriver<W: Write + Send + 'static> {
	registry: Arc<Registry>,
	output: Arc<Output<W>>,
	waiting: Arc<WaitingSet>,
}

impl<W: Write + Send + 'static> ProtocolDriver<W> {
	/// Build a driver writing to `writer` and bound to `registry`. Subscribes the rendezvous
	/// listener on the registry immediately; it stays subscribed for the registry's lifetime.
	pub fn new(registry: Arc<Registry>, writer: W) -> Self {
		let output = Arc::new(Output::new(writer));
		let waiting = Arc::new(WaitingSet::new());

		{
			let output = output.clone();
			let waiting = waiting.clone();
			let registry = registry.clone();
			registry.on_change(move |hash: &str| {
				if !waiting.contains(hash) {
					return;
				}
				let candidates = waiting.take();
				let changed = registry.changed_replicas(&candidates);
				if changed.is_empty() {
					// Someone else's on_change raced us and already drained the set; put the
					// candidates back rather than silently losing the wait.
					for h in candidates {
						waiting.insert(&h);
					}
					return;
				}
				debug!(?changed, "resolving WAIT rendezvous");
				if let Err(err) = output.send("CHANGES", &changed) {
					warn!(%err, "failed writing CHANGES to parent");
				}
			});
		}

		Self {
			registry,
			output,
			waiting,
		}
	}

	/// Run the driver to completion, reading lines from `input` until EOF.
	///
	/// Writes `VERSION 1` before reading anything. Returns [`CriticalError::IoEnd`] on a clean
	/// EOF (this is the normal, successful termination of the loop) or another `CriticalError` on
	/// an unreadable stream.
	pub fn run(&self, mut input: impl BufRead) -> Result<(), CriticalError> {
		self.output
			.send("VERSION", &["1".to_string()])
			.map_err(|err| CriticalError::IoError { about: "writing VERSION", err })?;

		let mut line = String::new();
		loop {
			line.clear();
			let n = input
				.read_line(&mut line)
				.map_err(|err| CriticalError::IoError { about: "reading command", err })?;
			if n == 0 {
				debug!("stdin closed, exiting main loop");
				return Err(CriticalError::IoEnd);
			}

			let tokens = tokenize(&line);
			if tokens.is_empty() {
				continue;
			}

			let command = tokens[0].as_str();
			let args = &tokens[1..];

			if command != "WAIT" {
				self.waiting.clear();
			}

			self.dispatch(command, args, &mut input);
		}
	}

	fn dispatch(&self, command: &str, args: &[String], input: &mut impl BufRead) {
		match command {
			"START" => self.handle_start(args, input),
			"CHANGES" => self.handle_changes(args),
			"WAIT" => self.handle_wait(args),
			"RESET" => self.handle_reset(args),
			"DONE" | "DIR" | "LINK" => {
				// Only valid inside a START sub-dialog; outside of one, a malformed/stray line.
				let err = RuntimeError::Malformed(command.to_string());
				warn!(%err, "command only valid inside a START sub-dialog, ignoring");
			}
			_ => {
				let err = RuntimeError::Malformed(command.to_string());
				warn!(%err, "unknown command, ignoring");
			}
		}
	}

	fn handle_start(&self, args: &[String], input: &mut impl BufRead) {
		let Some(hash) = args.first() else {
			warn!("START missing hash argument");
			return;
		};
		let Some(fspath) = args.get(1) else {
			warn!("START missing fspath argument");
			return;
		};
		let path = args.get(2).cloned();

		self.registry.add_replica(Replica::new(hash.clone(), fspath.clone(), path));

		if let Err(err) = self.output.ack() {
			warn!(%err, "failed acking START");
			return;
		}

		// Sub-dialog: answer OK to each DIR/LINK until DONE.
		let mut line = String::new();
		loop {
			line.clear();
			match input.read_line(&mut line) {
				Ok(0) => return, // EOF mid-subdialog: let the outer loop observe it next.
				Ok(_) => {}
				Err(err) => {
					warn!(%err, "error reading START sub-dialog");
					return;
				}
			}

			let tokens = tokenize(&line);
			let Some(sub_command) = tokens.first() else {
				continue;
			};

			match sub_command.as_str() {
				"DONE" => return,
				"DIR" | "LINK" => {
					if let Err(err) = self.output.ack() {
						warn!(%err, "failed acking START sub-dialog command");
						return;
					}
				}
				other => {
					warn!(command = other, "unexpected command inside START sub-dialog, ignoring");
				}
			}
		}
	}

	fn handle_changes(&self, args: &[String]) {
		let Some(hash) = args.first() else {
			warn!("CHANGES missing hash argument");
			return;
		};

		if !self.registry.has_replica(hash) {
			warn!(hash, "CHANGES for unknown replica");
			if let Err(err) = self.output.send("DONE", &[]) {
				warn!(%err, "failed writing DONE");
			}
			return;
		}

		let tree = self.registry.consume_directory(hash);
		for path in compact_ordered(&tree) {
			if let Err(err) = self.output.send("RECURSIVE", &[path]) {
				warn!(%err, "failed writing RECURSIVE");
				return;
			}
		}
		if let Err(err) = self.output.send("DONE", &[]) {
			warn!(%err, "failed writing DONE");
		}
	}

	fn handle_wait(&self, args: &[String]) {
		let Some(hash) = args.first() else {
			warn!("WAIT missing hash argument");
			return;
		};

		if !self.registry.has_replica(hash) {
			warn!(hash, "WAIT for unknown replica");
			return;
		}

		let mut candidates = self.waiting.take();
		candidates.push(hash.clone());

		let changed = self.registry.changed_replicas(&candidates);
		if changed.is_empty() {
			for h in &candidates {
				self.waiting.insert(h);
			}
			trace!(hash, "no changes pending, entering wait");
		} else {
			debug!(?changed, "changes already pending, resolving WAIT immediately");
			if let Err(err) = self.output.send("CHANGES", &changed) {
				warn!(%err, "failed writing CHANGES");
			}
		}
	}

	fn handle_reset(&self, args: &[String]) {
		let Some(hash) = args.first() else {
			warn!("RESET missing hash argument");
			return;
		};
		self.registry.discard_directory(hash);
	}
}

/// `ChangeTree::compact` in a deterministic, sorted order (the underlying trie already visits
/// children in sorted order, this just documents the guarantee at the call site).
fn compact_ordered(tree: &ChangeTree) -> Vec<String> {
	tree.compact()
}
