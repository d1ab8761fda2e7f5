//! UI localization.
//!
//! - `registry`: the fixed set of supported locales
//! - `locale`: validated `Locale` type
//! - `catalog`: flat key/value catalogs and where they are loaded from
//! - `translator`: active locale, fallback, text substitution
//! - `validator`: consistency checks between catalogs
//! - `metrics`: catalog cache and fetch counters
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use speedcheck::i18n::{EmbeddedCatalogSource, Translator};
//! use speedcheck::storage::MemoryPreferenceStore;
//!
//! let mut translator = Translator::new(
//!     Arc::new(EmbeddedCatalogSource::bundled()),
//!     Arc::new(MemoryPreferenceStore::new()),
//! );
//! translator.select_locale("it", &mut page).await;
//! assert_eq!(translator.lookup("show-more"), "MOSTRA PIÙ INFORMAZIONI");
//! ```

mod catalog;
mod locale;
mod metrics;
mod registry;
mod translator;
mod validator;

pub use catalog::{
    Catalog, CatalogError, CatalogSource, DirectoryCatalogSource, EmbeddedCatalogSource,
    HttpCatalogSource,
};
pub use locale::{Locale, LocaleError};
pub use metrics::{CatalogMetrics, MetricsReport};
pub use registry::{LocaleConfig, LocaleRegistry};
pub use translator::{SelectOutcome, Translator, PAGE_TITLE_KEY, SHOW_LESS_KEY, SHOW_MORE_KEY};
pub use validator::{CatalogValidator, ValidationReport};
