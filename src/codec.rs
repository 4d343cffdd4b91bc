//! Percent-encoding of wire tokens and the whitespace tokenizer (§4.6).

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything `NON_ALPHANUMERIC` would escape, except `/`, `.`, `-`, `_` and `~`: the wire
/// protocol preserves `/` so paths stay legible, and the rest are RFC 3986 "unreserved"
/// characters the original's `g_uri_escape_string(s, "/", false)` also leaves literal. Without
/// this, every ordinary path containing a dot, dash or underscore would be escaped byte-for-byte
/// (and the root path `.` would encode as `%2E`, breaking the `RECURSIVE .` response).
const ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'/')
	.remove(b'.')
	.remove(b'-')
	.remove(b'_')
	.remove(b'~');

/// Percent-encode `s`, preserving `/`.
pub fn encode(s: &str) -> String {
	utf8_percent_encode(s, ENCODE_SET).to_string()
}

/// The inverse of [`encode`]. Invalid UTF-8 in the decoded bytes is replaced per
/// [`String::from_utf8_lossy`] semantics.
pub fn decode(s: &str) -> String {
	percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Split `line` into whitespace-separated tokens (runs of space or tab), discarding empty
/// tokens, and percent-decode each one.
pub fn tokenize(line: &str) -> Vec<String> {
	line.trim_end()
		.split(|c: char| c == ' ' || c == '\t')
		.filter(|tok| !tok.is_empty())
		.map(decode)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encode_preserves_slash() {
		assert_eq!(encode("a/b c"), "a/b%20c");
	}

	#[test]
	fn encode_leaves_unreserved_characters_literal() {
		assert_eq!(encode("."), ".");
		assert_eq!(encode("src/main-v1_2.rs"), "src/main-v1_2.rs");
		assert_eq!(encode("~backup"), "~backup");
	}

	#[test]
	fn decode_is_left_inverse_of_encode() {
		for s in ["hello", "a/b c", "100% done", "emoji 🎉 path", ""] {
			assert_eq!(decode(&encode(s)), s);
		}
	}

	#[test]
	fn tokenize_skips_empty_tokens_and_decodes() {
		let tokens = tokenize("START r1\t/tmp/r1%20dir  sub\n");
		assert_eq!(tokens, vec!["START", "r1", "/tmp/r1 dir", "sub"]);
	}

	#[test]
	fn tokenize_empty_line_is_empty() {
		assert!(tokenize("").is_empty());
		assert!(tokenize("   \t \t").is_empty());
	}

	#[test]
	fn tokenization_is_stable_under_roundtrip() {
		let original = vec!["a/b".to_string(), "c d".to_string(), "100%".to_string()];
		let line = original
			.iter()
			.map(|t| encode(t))
			.collect::<Vec<_>>()
			.join(" ");
		assert_eq!(tokenize(&line), original);
	}
}
