//! Column name normalization
//!
//! `normalize_name` trims, lowercases, collapses every run of characters
//! outside `[a-z0-9_]` into a single `_` and strips leading/trailing `_`.
//! The rule is idempotent.
//!
//! Normalizing can produce empty or duplicate names (`"Arr Delay"` and
//! `"arr-delay"` both become `arr_delay`). [`disambiguate`] resolves those
//! deterministically before the names reach a [`Dataset`].

use crate::dataset::Dataset;
use crate::error::Result;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::warn;

#[allow(clippy::unwrap_used)]
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").unwrap());

/// Canonical form of one column label.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    DISALLOWED
        .replace_all(&lowered, "_")
        .trim_matches('_')
        .to_string()
}

/// Canonical form of every label, position for position.
///
/// Labels made only of disallowed characters come back as empty strings.
pub fn normalize_columns<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter().map(|s| normalize_name(s.as_ref())).collect()
}

/// Make normalized names unique and non-empty.
///
/// - an empty name becomes `column_{position}` (zero based)
/// - a repeated name gets `_1`, `_2`, ... in order of appearance, skipping
///   suffixes that are already taken
///
/// Names that are already unique and non-empty are returned unchanged.
pub fn disambiguate(names: Vec<String>) -> Vec<String> {
    let reserved: HashSet<String> = names.iter().filter(|n| !n.is_empty()).cloned().collect();
    let mut emitted: HashSet<String> = HashSet::with_capacity(names.len());
    let mut result = Vec::with_capacity(names.len());

    for (position, name) in names.into_iter().enumerate() {
        let was_empty = name.is_empty();
        let base = if was_empty {
            format!("column_{position}")
        } else {
            name
        };

        let collides = emitted.contains(&base) || (was_empty && reserved.contains(&base));
        let resolved = if collides {
            (1..)
                .map(|n| format!("{base}_{n}"))
                .find(|candidate| !reserved.contains(candidate) && !emitted.contains(candidate))
                .unwrap_or_default()
        } else {
            base.clone()
        };

        if was_empty {
            warn!(position, renamed = %resolved, "Column name normalized to empty string");
        } else if collides {
            warn!(column = %base, renamed = %resolved, "Duplicate column name after normalization");
        }

        emitted.insert(resolved.clone());
        result.push(resolved);
    }

    result
}

/// Normalize and disambiguate the column names of a dataset.
pub fn normalize_dataset(dataset: Dataset) -> Result<Dataset> {
    let names = disambiguate(normalize_columns(&dataset.column_names()));
    dataset.with_column_names(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, ColumnData};
    use proptest::prelude::*;

    #[test]
    fn test_normalize_name_examples() {
        assert_eq!(normalize_name("  Arr Delay "), "arr_delay");
        assert_eq!(normalize_name("CarrierDelay"), "carrierdelay");
        assert_eq!(normalize_name("Unnamed: 0"), "unnamed_0");
        assert_eq!(normalize_name("__Weather--Delay (min)__"), "weather_delay_min");
        assert_eq!(normalize_name("a__b"), "a__b");
        assert_eq!(normalize_name("%%%"), "");
    }

    #[test]
    fn test_normalize_columns_keeps_empty() {
        assert_eq!(
            normalize_columns(&["Year", "???", "Month"]),
            vec!["year", "", "month"]
        );
    }

    #[test]
    fn test_disambiguate_duplicates() {
        let names = vec!["delay".to_string(), "delay".to_string(), "delay".to_string()];
        assert_eq!(disambiguate(names), vec!["delay", "delay_1", "delay_2"]);
    }

    #[test]
    fn test_disambiguate_skips_taken_suffix() {
        let names = vec!["x".to_string(), "x".to_string(), "x_1".to_string()];
        assert_eq!(disambiguate(names), vec!["x", "x_2", "x_1"]);
    }

    #[test]
    fn test_disambiguate_empty_names() {
        let names = vec!["".to_string(), "year".to_string(), "".to_string()];
        assert_eq!(disambiguate(names), vec!["column_0", "year", "column_2"]);
    }

    #[test]
    fn test_normalize_dataset() {
        let ds = Dataset::new(vec![
            Column::new("Arr Delay", ColumnData::Integer(vec![Some(1)])),
            Column::new("arr-delay", ColumnData::Integer(vec![Some(2)])),
        ])
        .unwrap();

        let ds = normalize_dataset(ds).unwrap();
        assert_eq!(ds.column_names(), vec!["arr_delay", "arr_delay_1"]);
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(raw in proptest::collection::vec(".{0,24}", 0..8)) {
            let once = normalize_columns(&raw);
            let twice = normalize_columns(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_case_and_whitespace_converge(name in "[A-Za-z0-9 _-]{0,16}", pad in "[ \t]{0,3}") {
            let shouted = format!("{pad}{}{pad}", name.to_uppercase());
            prop_assert_eq!(normalize_name(&shouted), normalize_name(&name.to_lowercase()));
        }

        #[test]
        fn prop_output_charset(name in ".{0,32}") {
            let normalized = normalize_name(&name);
            prop_assert!(normalized.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!normalized.starts_with('_') && !normalized.ends_with('_'));
        }

        #[test]
        fn prop_disambiguated_names_are_unique(raw in proptest::collection::vec("[a-c_ ]{0,3}", 0..10)) {
            let names = disambiguate(normalize_columns(&raw));
            let unique: HashSet<&String> = names.iter().collect();
            prop_assert_eq!(unique.len(), names.len());
            prop_assert!(names.iter().all(|n| !n.is_empty()));
            prop_assert_eq!(disambiguate(names.clone()), names);
        }
    }
}
