//! The per-replica trie of pending changes.
//!
//! A [`ChangeTree`] accumulates "this subtree changed" markers from many filesystem events and
//! compacts them into the smallest set of paths that covers every change, per §4.1 of the design:
//! a terminated node subsumes all of its descendants, so the tree only needs to remember the
//! shallowest terminated node on each branch.

use std::collections::BTreeMap;

/// A node in the change trie.
///
/// The root node represents the replica root itself; `record([])` terminates the root and
/// `compact_into` emits it as `"."`, matching the `RECURSIVE .` response of scenario S4.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeTree {
	terminated: bool,
	has_changes: bool,
	children: BTreeMap<String, ChangeTree>,
}

impl ChangeTree {
	/// A fresh, empty tree: no changes recorded.
	pub fn new() -> Self {
		Self::default()
	}

	/// True iff no change has been recorded anywhere in this tree.
	pub fn is_empty(&self) -> bool {
		!self.has_changes
	}

	/// Record a change at `relative_path`, a sequence of path components relative to the replica
	/// root. An empty sequence means the root itself changed.
	///
	/// Creates any missing intermediate nodes, marks every node walked as having changes, and
	/// terminates the final node (the root, if `relative_path` is empty).
	pub fn record<I, S>(&mut self, relative_path: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut node = self;
		node.has_changes = true;

		for component in relative_path {
			node = node.children.entry(component.into()).or_default();
			node.has_changes = true;
		}

		node.terminate();
	}

	/// Mark this node as terminated: everything at or below it is considered changed.
	fn terminate(&mut self) {
		self.terminated = true;
		self.has_changes = true;
	}

	/// True iff this exact node is terminated (its descendants carry no extra information).
	pub fn terminated(&self) -> bool {
		self.terminated
	}

	/// Compact this tree into the minimal list of paths that covers every terminated node.
	///
	/// The root, if terminated, is emitted as `"."`. Otherwise each child is joined to its parent
	/// path with `/` (plain POSIX joining, no normalization).
	pub fn compact(&self) -> Vec<String> {
		let mut out = Vec::new();
		self.compact_into(".", &mut out);
		out
	}

	fn compact_into(&self, path: &str, out: &mut Vec<String>) {
		if self.terminated {
			out.push(path.to_string());
			return;
		}

		for (component, child) in &self.children {
			let child_path = if path == "." {
				component.clone()
			} else {
				format!("{path}/{component}")
			};
			child.compact_into(&child_path, out);
		}
	}
}
