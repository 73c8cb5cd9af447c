//! Text normalization and content hashing.
//!
//! Every subsystem that needs a content identity goes through
//! [`content_hash`] so that "identical normalized text" means the same
//! thing to the indexing pipeline, the embedding cache and the result
//! deduplication step.

/// Collapse all whitespace runs to single spaces and trim the ends.
/// Normalization is case-preserving: hashes must distinguish texts that
/// differ only in casing of codes and identifiers.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Blake3 hex digest of the normalized text.
pub fn content_hash(text: &str) -> String {
    blake3::hash(normalize_text(text).as_bytes())
        .to_hex()
        .to_string()
}

/// Lowercased alphanumeric terms of a text, in order, punctuation split.
pub fn terms_of(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
