//! Text normalization shared by the lexicon index and incoming queries.
//!
//! Both sides go through the same pipeline so that `"AirHandlingUnit"`,
//! `"air_handling-unit"` and `"Air Handling Unit"` all meet as
//! `"air handling unit"`.

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::canonical_combining_class;

/// Lowercase letter or digit immediately followed by an uppercase letter.
static RE_CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));

static RE_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9]+").expect("static regex"));

fn strip_diacritics(s: &str) -> String {
    s.nfkd()
        .filter(|c| canonical_combining_class(*c) == 0)
        .collect()
}

fn split_identifier(s: &str) -> String {
    RE_CAMEL_BOUNDARY
        .replace_all(s, "$1 $2")
        .replace(['_', '-'], " ")
}

/// Normalize a surface form or query to lowercase ASCII words joined by single spaces.
///
/// Idempotent: normalizing an already-normalized string returns it unchanged.
pub fn normalize_text(s: &str) -> String {
    let s: String = s.trim().nfkc().collect();
    let s = strip_diacritics(&s);
    let s = split_identifier(&s).to_lowercase();
    RE_WORD
        .find_iter(&s)
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalize and split into tokens, dropping a trailing `s` from tokens longer
/// than three characters.
pub fn tokenize(s: &str) -> Vec<String> {
    normalize_text(s)
        .split_whitespace()
        .map(|t| {
            if t.chars().count() > 3 && t.ends_with('s') {
                t[..t.len() - 1].to_string()
            } else {
                t.to_string()
            }
        })
        .collect()
}

/// First letter of every token, concatenated.
pub fn initialism<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .filter_map(|t| t.as_ref().chars().next())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_case_and_delimiters() {
        assert_eq!(normalize_text("AirHandlingUnit"), "air handling unit");
        assert_eq!(normalize_text("supply_air-temp"), "supply air temp");
        assert_eq!(normalize_text("  Zone2Temp  "), "zone2 temp");
    }

    #[test]
    fn keeps_runs_of_capitals_together() {
        assert_eq!(normalize_text("AHU"), "ahu");
        assert_eq!(normalize_text("VAVBox"), "vavbox");
    }

    #[test]
    fn strips_diacritics_and_punctuation() {
        assert_eq!(normalize_text("Café Pümp!"), "cafe pump");
        assert_eq!(normalize_text("ﬁlter"), "filter");
        assert_eq!(normalize_text("a.b/c"), "a b c");
    }

    #[test]
    fn normalization_is_idempotent() {
        for raw in [
            "AirHandlingUnit",
            "Supply_Air_Temperature_Sensor",
            "Café Pümp",
            "hasPoint",
            "",
            "   ",
            "x1Y2z3",
        ] {
            let once = normalize_text(raw);
            assert_eq!(normalize_text(&once), once, "input: {raw:?}");
        }
    }

    #[test]
    fn empty_input_normalizes_to_empty() {
        assert_eq!(normalize_text(""), "");
        assert!(tokenize("  -_- ").is_empty());
    }

    #[test]
    fn tokenize_singularizes_long_tokens_only() {
        assert_eq!(tokenize("Supply Fans"), vec!["supply", "fan"]);
        assert_eq!(tokenize("gas bus"), vec!["gas", "bus"]);
        assert_eq!(tokenize("hasPoints"), vec!["has", "point"]);
    }

    #[test]
    fn initialism_takes_first_letters() {
        assert_eq!(initialism(&["air", "handling", "unit"]), "ahu");
        assert_eq!(initialism::<&str>(&[]), "");
    }
}
