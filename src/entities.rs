//! Entity extraction from raw query text.
//!
//! Pure and infallible: a category that finds nothing is simply left empty
//! (and omitted when serialized).
//!
//! # Categories
//!
//! | Category | Matches |
//! |----------|---------|
//! | `numbers` | Every numeric substring, signed where the sign is not a separator |
//! | `dates` | ISO `YYYY-MM-DD` |
//! | `ocean_terms` | Variable and basin vocabulary, including plural forms |
//!
//! Terms are matched case-insensitively from a word boundary, so
//! "Temperatures" yields `temperature` and "salinities" yields `salinity`,
//! while "Indianapolis" does not yield `indian`. Each term is reported once,
//! in vocabulary order, under its singular form.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::Entities;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d+\.?\d*").expect("Invalid regex"));

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("Invalid regex"));

/// Measured variables and profile structure.
const VARIABLE_TERMS: &[&str] = &[
    "temperature",
    "salinity",
    "pressure",
    "depth",
    "latitude",
    "longitude",
    "oxygen",
    "density",
    "thermocline",
    "mixed layer",
];

/// Basins and regional seas.
const GEOGRAPHIC_TERMS: &[&str] = &[
    "pacific",
    "atlantic",
    "indian",
    "southern ocean",
    "arctic",
    "arabian sea",
    "bay of bengal",
    "mediterranean",
    "caribbean",
    "south china sea",
];

static TERM_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    VARIABLE_TERMS
        .iter()
        .chain(GEOGRAPHIC_TERMS.iter())
        .map(|term| (*term, Regex::new(&term_pattern(term)).expect("Invalid regex")))
        .collect()
});

/// Case-insensitive pattern for `term` and its plural.
///
/// `density` → `densities`, `depth` → `depths`, `mixed layer` →
/// `mixed layers`. Only the trailing word is inflected.
fn term_pattern(term: &str) -> String {
    let spaced = term.replace(' ', r"\s+");
    match spaced.strip_suffix('y') {
        Some(stem) => format!(r"(?i)\b{}(?:y|ies)\b", stem),
        None => format!(r"(?i)\b{}(?:e?s)?\b", spaced),
    }
}

/// Returns true for basin and regional-sea vocabulary.
///
/// `argo classify` uses this to list the geographic terms of a query
/// separately from the measured variables.
pub fn is_geographic_term(term: &str) -> bool {
    GEOGRAPHIC_TERMS.contains(&term)
}

/// Extract numbers, ISO dates and ocean vocabulary from `text`.
///
/// # Arguments
///
/// * `text` — the raw user query, unmodified.
///
/// # Returns
///
/// An [`Entities`] value. Every category may be empty; extraction never
/// fails.
///
/// # Example
///
/// ```rust
/// use argo_rag::entities::extract_entities;
///
/// let e = extract_entities("Count all profiles with temperatures > 25");
/// assert_eq!(e.numbers, vec![25.0]);
/// assert_eq!(e.ocean_terms, vec!["temperature"]);
/// ```
pub fn extract_entities(text: &str) -> Entities {
    Entities {
        numbers: extract_numbers(text),
        dates: DATE_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect(),
        ocean_terms: TERM_PATTERNS
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(term, _)| term.to_string())
            .collect(),
    }
}

/// All numeric substrings in order of appearance.
///
/// A leading `-` counts as a sign only when it does not directly follow a
/// letter or digit, so `2023-06-15` yields `[2023, 6, 15]` while
/// `lon -45.5` yields `[-45.5]`.
fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER_PATTERN
        .find_iter(text)
        .filter_map(|m| {
            let raw = m.as_str();
            let preceded_by_word = text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
            let raw = if preceded_by_word {
                raw.trim_start_matches('-')
            } else {
                raw
            };
            raw.parse::<f64>().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_and_threshold() {
        let e = extract_entities("Count all profiles with temperature > 25");
        assert_eq!(e.numbers, vec![25.0]);
        assert_eq!(e.ocean_terms, vec!["temperature"]);
        assert!(e.dates.is_empty());
    }

    #[test]
    fn test_negative_coordinates() {
        let e = extract_entities("profiles near latitude -12.5 and longitude 78.9");
        assert_eq!(e.numbers, vec![-12.5, 78.9]);
    }

    #[test]
    fn test_dates_do_not_produce_negative_parts() {
        let e = extract_entities("between 2023-01-01 and 2023-12-31");
        assert_eq!(e.dates, vec!["2023-01-01", "2023-12-31"]);
        assert_eq!(e.numbers, vec![2023.0, 1.0, 1.0, 2023.0, 12.0, 31.0]);
    }

    #[test]
    fn test_ocean_terms_case_insensitive() {
        let e = extract_entities("Show me warm water profiles in the Arabian Sea");
        assert_eq!(e.ocean_terms, vec!["arabian sea"]);
        assert!(e.ocean_terms.iter().any(|t| is_geographic_term(t)));
    }

    #[test]
    fn test_plural_terms_recognized() {
        let e = extract_entities("Show temperatures and depths in the Pacific");
        assert_eq!(e.ocean_terms, vec!["temperature", "depth", "pacific"]);

        let e = extract_entities("compare salinities and densities across mixed layers");
        assert_eq!(e.ocean_terms, vec!["salinity", "density", "mixed layer"]);
    }

    #[test]
    fn test_term_needs_leading_word_boundary() {
        let e = extract_entities("indianapolis subtemperature");
        assert!(e.ocean_terms.is_empty());
    }

    #[test]
    fn test_term_rejects_other_suffixes() {
        let e = extract_entities("depthwise pacifically");
        assert!(e.ocean_terms.is_empty());
    }

    #[test]
    fn test_nothing_found() {
        let e = extract_entities("hello there");
        assert!(e.is_empty());
    }
}
