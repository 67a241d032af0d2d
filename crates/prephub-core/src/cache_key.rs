//! Deterministic cache-key construction.
//!
//! Keys are persisted in the durable cache tier, so they must be stable
//! across processes and releases. Long free text (lesson context, code,
//! questions) is folded into a SHA-256 digest instead of being embedded.

use sha2::{Digest, Sha256};

/// Separator between key parts.
const SEPARATOR: &str = ":";

/// Hex characters kept from a digest (128 bits).
const DIGEST_LEN: usize = 32;

/// Builder for cache keys of the form `operation:part:part:digest`.
///
/// # Example
///
/// ```
/// use prephub_core::CacheKeyBuilder;
///
/// let key = CacheKeyBuilder::new("explain_v2")
///     .part("advanced")
///     .part("javascript")
///     .part("closures")
///     .digest("optional long lesson context")
///     .build();
///
/// assert!(key.starts_with("explain_v2:advanced:javascript:closures:"));
/// ```
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    parts: Vec<String>,
}

impl CacheKeyBuilder {
    /// Start a key for the named operation.
    pub fn new(operation: impl AsRef<str>) -> Self {
        Self {
            parts: vec![escape(operation.as_ref())],
        }
    }

    /// Append a short identifier verbatim.
    pub fn part(mut self, value: impl AsRef<str>) -> Self {
        self.parts.push(escape(value.as_ref()));
        self
    }

    /// Append a stable digest of arbitrary text.
    ///
    /// Empty text is recorded as `none` so that "no context" and
    /// "empty context" share a key.
    pub fn digest(mut self, text: impl AsRef<str>) -> Self {
        self.parts.push(digest(text.as_ref()));
        self
    }

    /// Finish the key.
    pub fn build(self) -> String {
        self.parts.join(SEPARATOR)
    }
}

/// Stable, truncated SHA-256 hex digest of `text`.
pub fn digest(text: &str) -> String {
    if text.trim().is_empty() {
        return "none".to_string();
    }
    let mut encoded = hex::encode(Sha256::digest(text.as_bytes()));
    encoded.truncate(DIGEST_LEN);
    encoded
}

// Parts may contain the separator; escape it so ("a:b", "c") and
// ("a", "b:c") never collide.
fn escape(value: &str) -> String {
    value.replace('%', "%25").replace(SEPARATOR, "%3A")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_key() {
        let a = CacheKeyBuilder::new("quiz").part("react").digest("ctx").build();
        let b = CacheKeyBuilder::new("quiz").part("react").digest("ctx").build();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_context_different_key() {
        let a = CacheKeyBuilder::new("explain").digest("closures capture").build();
        let b = CacheKeyBuilder::new("explain").digest("closures copy").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_separator_in_parts_does_not_collide() {
        let a = CacheKeyBuilder::new("op").part("a:b").part("c").build();
        let b = CacheKeyBuilder::new("op").part("a").part("b:c").build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_digest_is_stable_and_truncated() {
        // sha256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e...
        assert_eq!(digest("hello"), "2cf24dba5fb0a30e26e83b2ac5b9e29e");
        assert_eq!(digest("   "), "none");
    }
}
