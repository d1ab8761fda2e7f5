//! Locale registry: the fixed set of locales the UI can be shown in.
//!
//! The registry is immutable and initialized once with `OnceLock`. It holds no
//! per-session state: the active locale lives on each `Translator`.

use std::sync::OnceLock;

/// Metadata for a supported locale.
#[derive(Debug, Clone)]
pub struct LocaleConfig {
    /// ISO 639-1 code, also the catalog file stem (e.g. "en" -> `en.json`)
    pub code: &'static str,

    /// English name of the locale (e.g. "Italian")
    pub name: &'static str,

    /// Native name of the locale (e.g. "Italiano")
    pub native_name: &'static str,

    /// Whether this is the fallback locale (exactly one must be true)
    pub is_default: bool,

    /// Whether the locale can be selected
    pub enabled: bool,
}

/// Registry of all known locales.
pub struct LocaleRegistry {
    locales: Vec<LocaleConfig>,
}

static REGISTRY: OnceLock<LocaleRegistry> = OnceLock::new();

impl LocaleRegistry {
    /// Get the registry instance, initializing it on first call.
    pub fn get() -> &'static LocaleRegistry {
        REGISTRY.get_or_init(|| LocaleRegistry {
            locales: default_locales(),
        })
    }

    /// Look up a locale by code.
    pub fn get_by_code(&self, code: &str) -> Option<&LocaleConfig> {
        self.locales.iter().find(|locale| locale.code == code)
    }

    /// All locales that can be selected.
    pub fn list_enabled(&self) -> Vec<&LocaleConfig> {
        self.locales.iter().filter(|locale| locale.enabled).collect()
    }

    /// The fallback locale.
    ///
    /// # Panics
    /// Panics if the registry does not define exactly one default locale. This
    /// is a build-time data error, not a runtime condition.
    pub fn default_locale(&self) -> &LocaleConfig {
        let defaults: Vec<_> = self
            .locales
            .iter()
            .filter(|locale| locale.is_default)
            .collect();

        match defaults.len() {
            0 => panic!("No default locale found in registry"),
            1 => defaults[0],
            _ => panic!("Multiple default locales found in registry"),
        }
    }

    /// Check whether a code names an enabled locale.
    pub fn is_supported(&self, code: &str) -> bool {
        self.get_by_code(code)
            .map(|locale| locale.enabled)
            .unwrap_or(false)
    }
}

fn default_locales() -> Vec<LocaleConfig> {
    vec![
        LocaleConfig {
            code: "en",
            name: "English",
            native_name: "English",
            is_default: true,
            enabled: true,
        },
        LocaleConfig {
            code: "it",
            name: "Italian",
            native_name: "Italiano",
            is_default: false,
            enabled: true,
        },
    ]
}
