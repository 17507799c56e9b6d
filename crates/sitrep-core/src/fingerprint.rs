//! # Error Fingerprinting
//!
//! Stable, path/line-insensitive keys for build error messages.
//!
//! Two sightings of the same underlying error must map to one fingerprint
//! even when the compiler reports them from different files or lines.
//! Normalization rules, applied in order:
//!
//! 1. Lowercase the whole message.
//! 2. Strip a trailing `:line` or `:line:column` suffix from every token.
//! 3. Replace any token that still contains a path separator with `<path>`.
//! 4. Collapse runs of whitespace to single spaces.
//!
//! The fingerprint is the BLAKE3 hex digest of the normalized text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Placeholder substituted for path-like tokens during normalization.
pub const PATH_PLACEHOLDER: &str = "<path>";

// =============================================================================
// FINGERPRINT
// =============================================================================

/// A normalized, path/line-insensitive key derived from an error message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a raw error message.
    #[must_use]
    pub fn of(raw_message: &str) -> Self {
        let normalized = normalize(raw_message);
        Self(blake3::hash(normalized.as_bytes()).to_hex().to_string())
    }

    /// Wrap an already-computed hex digest (e.g. a stored key).
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Normalize an error message per the rules in the module docs.
#[must_use]
pub fn normalize(raw_message: &str) -> String {
    let lowered = raw_message.to_lowercase();
    let mut tokens: Vec<&str> = Vec::new();

    for token in lowered.split_whitespace() {
        let stripped = strip_location(token);
        if stripped.is_empty() {
            continue;
        }
        if stripped.contains('/') || stripped.contains('\\') {
            tokens.push(PATH_PLACEHOLDER);
        } else {
            tokens.push(stripped);
        }
    }

    tokens.join(" ")
}

/// Remove trailing punctuation and any `:line[:col]` digit suffixes.
fn strip_location(token: &str) -> &str {
    let mut t = token.trim_end_matches([',', ';', ':', ')']);
    loop {
        match t.rsplit_once(':') {
            Some((head, tail)) if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) => {
                t = head;
            }
            _ => break,
        }
    }
    t.trim_end_matches([',', ';', ':', ')'])
}

// =============================================================================
// TESTS
// =============================================================================
