//! Metadata value normalization.

use oym_latex::text::{fold_accents, strip_comments};

/// Clean a raw metadata argument: comments, accents, surrounding space.
#[must_use]
pub fn clean_meta(raw: &str) -> String {
    fold_accents(&strip_comments(raw)).trim().to_owned()
}

/// Normalize a comma-separated theme list to `"A, B"`.
#[must_use]
pub fn normalize_theme(value: &str) -> String {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Leading integer of `value` when it lies in 1..=5.
#[must_use]
pub fn parse_difficulty(value: &str) -> Option<u8> {
    let value = value.trim_start();
    let digits = value
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value, |end| &value[..end]);
    digits
        .parse::<u8>()
        .ok()
        .filter(|level| (1..=5).contains(level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_theme() {
        assert_eq!(normalize_theme("Algebra, Geometry"), "Algebra, Geometry");
        assert_eq!(normalize_theme(" Algebra ,Geometry,, "), "Algebra, Geometry");
        assert_eq!(normalize_theme(""), "");
    }

    #[test]
    fn test_parse_difficulty() {
        assert_eq!(parse_difficulty("3"), Some(3));
        assert_eq!(parse_difficulty(" 4 (difficile)"), Some(4));
        assert_eq!(parse_difficulty("abc"), None);
        assert_eq!(parse_difficulty("0"), None);
        assert_eq!(parse_difficulty("6"), None);
        assert_eq!(parse_difficulty("300"), None);
        assert_eq!(parse_difficulty(""), None);
    }

    #[test]
    fn test_clean_meta() {
        assert_eq!(clean_meta("  Probabilit\\'es % brouillon\n"), "Probabilités");
    }
}
