//! Catalog consistency checks.
//!
//! A translated catalog is compared against the default one: every key the
//! default defines should be translated, and `{placeholder}` tokens must
//! survive translation untouched.

use crate::i18n::Catalog;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

/// Errors and warnings found in a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Problems that leave UI text untranslated or broken
    pub errors: Vec<String>,

    /// Suspicious but harmless findings
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        !self.has_errors() && !self.has_warnings()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

pub struct CatalogValidator;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

impl CatalogValidator {
    /// Validate `candidate` against `reference` (normally the default locale).
    pub fn validate(reference: &Catalog, candidate: &Catalog) -> ValidationReport {
        let mut report = ValidationReport::new();

        let reference_keys: BTreeSet<&str> =
            reference.entries().keys().map(String::as_str).collect();
        let candidate_keys: BTreeSet<&str> =
            candidate.entries().keys().map(String::as_str).collect();

        let missing: Vec<&str> = reference_keys.difference(&candidate_keys).copied().collect();
        if !missing.is_empty() {
            report.errors.push(format!(
                "Missing keys in '{}': {:?}",
                candidate.locale(),
                missing
            ));
        }

        let extra: Vec<&str> = candidate_keys.difference(&reference_keys).copied().collect();
        if !extra.is_empty() {
            report.warnings.push(format!(
                "Keys in '{}' unknown to '{}': {:?}",
                candidate.locale(),
                reference.locale(),
                extra
            ));
        }

        let mut empty: Vec<&str> = candidate
            .entries()
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(key, _)| key.as_str())
            .collect();
        empty.sort_unstable();
        if !empty.is_empty() {
            report.warnings.push(format!(
                "Empty values in '{}': {:?}",
                candidate.locale(),
                empty
            ));
        }

        for key in reference_keys.intersection(&candidate_keys) {
            let expected = Self::extract_placeholders(&reference.entries()[*key]);
            let actual = Self::extract_placeholders(&candidate.entries()[*key]);
            if expected != actual {
                report.errors.push(format!(
                    "Placeholder mismatch for '{}': expected {:?}, found {:?}",
                    key, expected, actual
                ));
            }
        }

        report
    }

    /// Extract `{name}` tokens, sorted and deduplicated.
    fn extract_placeholders(text: &str) -> BTreeSet<String> {
        let regex = PLACEHOLDER_REGEX
            .get_or_init(|| Regex::new(r"\{[a-zA-Z0-9_-]+\}").expect("valid placeholder regex"));

        regex
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}
