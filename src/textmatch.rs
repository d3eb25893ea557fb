//! Normalized text comparison for period labels.
//!
//! The remote application renders period labels inconsistently across its
//! views: full month names, three-letter abbreviations, `MM/YYYY`, ISO
//! dates. Import-row matching therefore never compares raw strings; both
//! sides are reduced to a normalized form first.

use chrono::NaiveDate;

use crate::model::{MONTH_NAMES, Period};

/// Three-letter (plus "sept") month abbreviations and their full names.
const MONTH_ABBREVIATIONS: [(&str, &str); 13] = [
    ("jan", "january"),
    ("feb", "february"),
    ("mar", "march"),
    ("apr", "april"),
    ("may", "may"),
    ("jun", "june"),
    ("jul", "july"),
    ("aug", "august"),
    ("sep", "september"),
    ("sept", "september"),
    ("oct", "october"),
    ("nov", "november"),
    ("dec", "december"),
];

/// Reduce a label to its normalized form: lowercase, ISO dates collapsed to
/// "monthname year", month abbreviations expanded, whitespace collapsed.
pub fn normalize_label(text: &str) -> String {
    let lower = text.trim().to_lowercase();

    let words: Vec<String> = lower
        .split_whitespace()
        .map(|word| {
            if let Some(expanded) = expand_iso_date(word) {
                return expanded;
            }
            expand_month_abbreviation(word)
        })
        .collect();

    words.join(" ")
}

/// True if the normalized text contains any of the period's label candidates.
pub fn matches_period(text: &str, period: &Period) -> bool {
    let normalized = normalize_label(text);
    period
        .label_candidates()
        .iter()
        .any(|candidate| normalized.contains(candidate.as_str()))
}

/// "2025-07-01" -> "july 2025". Returns None for anything that is not a
/// well-formed ISO calendar date.
fn expand_iso_date(word: &str) -> Option<String> {
    let trimmed = word.trim_matches(|c: char| c == ',' || c == ';' || c == ':');
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()?;
    use chrono::Datelike;
    let name = MONTH_NAMES[(date.month() - 1) as usize];
    Some(format!("{} {}", name, date.year()))
}

/// "jul" / "jul." -> "july"; other words pass through unchanged.
fn expand_month_abbreviation(word: &str) -> String {
    let stripped = word.trim_end_matches('.');
    for (abbr, full) in MONTH_ABBREVIATIONS {
        if stripped == abbr {
            return full.to_string();
        }
    }
    word.to_string()
}
