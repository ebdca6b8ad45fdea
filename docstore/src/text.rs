//! Text normalization shared by the search trie and the document model.
//!
//! Every word that enters or queries the index goes through [`normalize`],
//! which makes lookups case- and punctuation-insensitive by construction.
//!
//! # Invariants
//!
//! - The output of [`normalize`] only contains `' '`, `'0'..='9'` and
//!   `'A'..='Z'`, so every byte is below [`ALPHABET_SIZE`].

use std::collections::BTreeMap;

/// Number of child links per trie node.
///
/// Normalized characters are indexed by their ASCII code, and the largest
/// code that survives normalization is `'Z'` (90).
pub const ALPHABET_SIZE: usize = 91;

/// Normalize a word or phrase for indexing.
///
/// Strips every character outside `[A-Za-z0-9 ]`, trims surrounding spaces
/// and uppercases the rest.
#[must_use]
pub fn normalize(input: &str) -> String {
    let kept: String = input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    kept.trim().to_ascii_uppercase()
}

/// Count occurrences of every normalized word in `text`.
///
/// Words are separated by spaces after punctuation has been stripped, so
/// `"don't stop"` yields `DONT` and `STOP`. Empty words produced by repeated
/// spaces are skipped.
#[must_use]
pub fn word_counts(text: &str) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for word in normalize(text).split(' ').filter(|w| !w.is_empty()) {
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_uppercases() {
        assert_eq!(normalize("Hello!"), "HELLO");
        assert_eq!(normalize("  tooth-brush, "), "TOOTHBRUSH");
        assert_eq!(normalize("a1 b2"), "A1 B2");
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn test_normalize_output_fits_alphabet() {
        let normalized = normalize("The quick, brown fox! 0123456789 ~`@#");
        assert!(normalized.bytes().all(|b| usize::from(b) < ALPHABET_SIZE));
    }

    #[test]
    fn test_word_counts() {
        let counts = word_counts("the cat and the hat, THE end");
        assert_eq!(counts.get("THE"), Some(&3));
        assert_eq!(counts.get("CAT"), Some(&1));
        assert_eq!(counts.get("END"), Some(&1));
        assert_eq!(counts.len(), 5);
    }

    #[test]
    fn test_word_counts_skips_empty_words() {
        let counts = word_counts("  spaced   out  ... ");
        assert_eq!(counts.len(), 2);
        assert!(!counts.contains_key(""));
    }
}
