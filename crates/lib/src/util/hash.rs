//! Identifier hashing.
//!
//! Build directories and synthetic output names are derived from truncated
//! SHA-1 digests so that they stay readable while remaining unique per
//! product and rule instance.

use serde::Serialize;
use sha1::{Digest, Sha1};

/// Lowercase hex SHA-1 of the input.
pub fn sha1_hex(bytes: &[u8]) -> String {
  let mut hasher = Sha1::new();
  hasher.update(bytes);
  format!("{:x}", hasher.finalize())
}

/// Hash of a value's JSON serialization. Used to detect changed property
/// maps across rule re-applications; determinism comes from the ordered
/// maps underneath.
pub fn fingerprint<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
  Ok(sha1_hex(serde_json::to_string(value)?.as_bytes()))
}

/// Restrict a string to the RFC 1034 identifier alphabet: ASCII letters,
/// digits and hyphens. Every other character maps to a hyphen.
pub fn rfc1034_identifier(input: &str) -> String {
  input
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
    .collect()
}
