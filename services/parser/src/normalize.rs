//! Text folding shared by every matching site: raw headers, month names and
//! geometry feature names.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Matching key for headers and month names.
///
/// Decomposes to NFKD, drops combining marks, lower-cases and trims.
/// Total and idempotent: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// Join key for boundary names: upper-cased with every whitespace character
/// removed. Diacritics are kept as-is.
pub fn geometry_key(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Removes the first matching leading phrase, compared case-insensitively.
/// The remainder is returned upper-cased, ready for [`geometry_key`].
pub fn strip_leading_phrase(text: &str, phrases: &[&str]) -> String {
    let upper = text.trim_start().to_uppercase();
    for phrase in phrases {
        if let Some(rest) = upper.strip_prefix(&phrase.to_uppercase()) {
            return rest.to_string();
        }
    }
    upper
}
