//! Command-line surface: just enough to pick a tracing verbosity and an optional debug log file
//! (§2.1, §6). Everything else about a replica — its hash, root, and sub-paths — arrives over the
//! wire protocol, not argv.

use std::path::PathBuf;

use clap::Parser;

/// Watches replica filesystem trees and reports accumulated changes over a line protocol on
/// stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "fsmonitor", version, about)]
pub struct Args {
	/// Increase logging verbosity. Pass multiple times for more detail (-v, -vv, -vvv).
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Append structured logs to this file instead of (or in addition to) stderr.
	///
	/// Only takes effect when built with the `debug` feature; otherwise it is accepted but
	/// ignored, matching the original implementation's compile-time `#ifdef DEBUG` logging guard.
	#[arg(long, value_name = "path")]
	pub log_file: Option<PathBuf>,
}

impl Args {
	/// Parse arguments from the process's `argv`.
	pub fn parse_from_env() -> Self {
		Self::parse()
	}
}
