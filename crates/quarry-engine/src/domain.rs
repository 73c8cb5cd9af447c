//! Structured-token extraction for the domain-pattern generator.
//!
//! Recognizes transaction-code-like tokens (two to four letters followed
//! by one to three digits, e.g. `FB01`, `va05`) and long numeric document
//! identifiers (eight or more digits). Matches are literal lookups, not
//! similarity, and are treated as high-confidence domain hits.

use regex::Regex;

pub struct DomainTokenizer {
    code: Regex,
    numeric_id: Regex,
}

impl Default for DomainTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainTokenizer {
    pub fn new() -> Self {
        // Static patterns; a failure here is a programming error.
        Self {
            code: Regex::new(r"\b[A-Za-z]{2,4}[0-9]{1,3}\b").expect("valid code pattern"),
            numeric_id: Regex::new(r"\b[0-9]{8,}\b").expect("valid id pattern"),
        }
    }

    /// Structured tokens of a raw query, first occurrence order, deduped.
    pub fn extract(&self, raw: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut tokens = Vec::new();
        for m in self.code.find_iter(raw).chain(self.numeric_id.find_iter(raw)) {
            let token = m.as_str().to_string();
            if seen.insert(token.to_lowercase()) {
                tokens.push(token);
            }
        }
        tokens
    }
}
