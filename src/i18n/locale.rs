//! Locale type: a code validated against the registry.

use crate::i18n::{LocaleConfig, LocaleRegistry};
use std::fmt;
use thiserror::Error;

/// Returned when a code does not name an enabled locale.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocaleError {
    #[error("Unknown locale code: '{0}'")]
    Unknown(String),
}

/// A validated locale.
///
/// Only supported, enabled locales can be constructed, so holding a `Locale`
/// means its catalog path and registry entry exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locale {
    code: &'static str,
}

impl Locale {
    pub const ENGLISH: Locale = Locale { code: "en" };
    pub const ITALIAN: Locale = Locale { code: "it" };

    /// Create a Locale from a code string.
    ///
    /// # Returns
    /// * `Ok(Locale)` if the code is known and enabled
    /// * `Err(LocaleError)` otherwise
    pub fn from_code(code: &str) -> Result<Locale, LocaleError> {
        LocaleRegistry::get()
            .get_by_code(code)
            .filter(|config| config.enabled)
            .map(|config| Locale { code: config.code })
            .ok_or_else(|| LocaleError::Unknown(code.to_string()))
    }

    /// The fallback locale used when nothing else can be loaded.
    pub fn fallback() -> Locale {
        Locale {
            code: LocaleRegistry::get().default_locale().code,
        }
    }

    /// Extract a supported locale from a system language tag.
    ///
    /// Accepts BCP 47 style tags (`it-IT`) and POSIX locale names
    /// (`it_IT.UTF-8`); only the primary subtag is considered.
    pub fn from_language_tag(tag: &str) -> Option<Locale> {
        let primary = tag
            .split(['-', '_', '.', '@'])
            .next()?
            .trim()
            .to_ascii_lowercase();
        Self::from_code(&primary).ok()
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Registry entry for this locale.
    ///
    /// # Panics
    /// Panics if the code is missing from the registry, which cannot happen for
    /// a `Locale` built through `from_code` or the constants.
    pub fn config(&self) -> &'static LocaleConfig {
        LocaleRegistry::get()
            .get_by_code(self.code)
            .expect("Locale code should always be valid")
    }

    pub fn name(&self) -> &'static str {
        self.config().name
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code)
    }
}
