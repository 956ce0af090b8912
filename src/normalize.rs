//! Title normalization for catalog matching.
//!
//! Recognized titles and catalog titles both pass through `normalize_title`
//! before any comparison, so the rules here decide which strings are
//! considered equal. Changing them changes which catalog track wins.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Parenthesized qualifier with surrounding whitespace: "Track (Extended Mix) " → "Track "
pub static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)\s*").unwrap());

/// Anything that is not a letter, number, underscore or whitespace.
///
/// Spelled out instead of `\w`: regex's `\w` also keeps combining marks and
/// drops `No` numbers like "²". Titles must compare the same way the catalog
/// matcher always has (letters and numbers only).
pub static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}_\s]").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Normalize a title (or artist name) for comparison.
///
/// Parenthesized qualifiers are dropped, punctuation is turned into spaces,
/// whitespace runs collapse to a single space and the result is lowercased.
/// Total and idempotent.
pub fn normalize_title(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    // Lowercase first: some capitals lowercase to a letter plus a combining
    // mark ("İ"), and the mark must go through the same filter
    let lowered = raw.to_lowercase();
    let result = PARENTHETICAL.replace_all(&lowered, " ");
    let result = NON_WORD.replace_all(&result, " ");

    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `normalize_title` for optional fields; `None` normalizes to "".
pub fn normalize_opt(raw: Option<&str>) -> String {
    raw.map(normalize_title).unwrap_or_default()
}

/// Word set of an already-normalized title.
pub fn title_words(normalized: &str) -> FxHashSet<&str> {
    normalized.split_whitespace().collect()
}

// ============================================================================
// TESTS
// ============================================================================
