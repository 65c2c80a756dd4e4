//! Category label → column-name fragment.
//!
//! Names are not truncated: the targets (GeoPackage, GeoParquet, memory
//! layers) accept long field names, and truncation would make distinct
//! categories collide.

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref REPEATED_UNDERSCORES: Regex = Regex::new(r"_+").unwrap();
}

/// Fragment returned when nothing usable survives sanitization.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Convert a human-readable label into `[a-z][a-z0-9_]*` (or `"unknown"`).
///
/// Diacritics are stripped ("ó" → "o", "ñ" → "n"), spaces, hyphens and
/// slashes become underscores, anything else outside `[a-z0-9_]` is dropped,
/// and a leading digit gets a `cat_` prefix.
///
/// # Examples
/// ```
/// use censo_layers::query_generator::sanitize::sanitize_label;
/// assert_eq!(sanitize_label("Sin instrucción"), "sin_instruccion");
/// assert_eq!(sanitize_label("0-14 años"), "cat_0_14_anos");
/// assert_eq!(sanitize_label("¿?"), "unknown");
/// ```
pub fn sanitize_label(label: &str) -> String {
    // NFKD splits accented letters into base letter + combining mark; the
    // marks (and every other non-ASCII char) are dropped.
    let ascii: String = label.nfkd().filter(char::is_ascii).collect();

    let mapped: String = ascii
        .to_lowercase()
        .chars()
        .filter_map(|ch| match ch {
            ' ' | '-' | '/' => Some('_'),
            'a'..='z' | '0'..='9' | '_' => Some(ch),
            _ => None,
        })
        .collect();

    let collapsed = REPEATED_UNDERSCORES.replace_all(&mapped, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        return UNKNOWN_LABEL.to_string();
    }
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        return format!("cat_{}", trimmed);
    }
    trimmed.to_string()
}
