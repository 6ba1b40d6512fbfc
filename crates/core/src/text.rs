//! Keyword normalization shared by the matcher and the compliance scanner.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Normalize `input` for comparison.
///
/// * `case_sensitive = false` folds to lowercase.
/// * `strip_accents = true` NFD-decomposes and drops combining marks, so
///   `"preço"` and `"preco"` compare equal.
///
/// Whitespace is trimmed at both ends. The function is idempotent.
pub fn normalize(input: &str, case_sensitive: bool, strip_accents: bool) -> String {
    let trimmed = input.trim();
    let folded = if case_sensitive {
        trimmed.to_string()
    } else {
        trimmed.to_lowercase()
    };
    if strip_accents {
        folded.nfd().filter(|c| !is_combining_mark(*c)).collect()
    } else {
        folded
    }
}

/// Lowercase + accent-stripped form used for heuristic scans.
pub fn fold(input: &str) -> String {
    normalize(input, false, true)
}
