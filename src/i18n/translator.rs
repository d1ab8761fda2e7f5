//! Active-locale management and text substitution.

use crate::i18n::{
    Catalog, CatalogMetrics, CatalogSource, CatalogValidator, Locale, ValidationReport,
};
use crate::page::Page;
use crate::storage::{PreferenceStore, PREFERRED_LOCALE_KEY};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Catalog key for the more-info button while the panel is collapsed
pub const SHOW_MORE_KEY: &str = "show-more";
/// Catalog key for the more-info button while the panel is expanded
pub const SHOW_LESS_KEY: &str = "show-less";
/// Catalog key for the document title
pub const PAGE_TITLE_KEY: &str = "page-title";

const BUILTIN_SHOW_MORE: &str = "SHOW MORE INFO";
const BUILTIN_SHOW_LESS: &str = "SHOW LESS INFO";

/// What `select_locale` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// The requested (or coerced) locale is active.
    Selected(Locale),
    /// The requested catalog failed and the default locale is active instead.
    FellBack { requested: Locale, active: Locale },
    /// No catalog could be loaded; the page text was left as it was.
    Untranslated { requested: Locale },
}

impl SelectOutcome {
    /// Locale whose catalog now drives the page, if any.
    pub fn active(&self) -> Option<Locale> {
        match self {
            SelectOutcome::Selected(locale) => Some(*locale),
            SelectOutcome::FellBack { active, .. } => Some(*active),
            SelectOutcome::Untranslated { .. } => None,
        }
    }
}

/// Loads, caches and applies locale catalogs.
pub struct Translator {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn PreferenceStore>,
    catalogs: HashMap<Locale, Catalog>,
    reports: HashMap<Locale, ValidationReport>,
    active: Locale,
    metrics: CatalogMetrics,
}

impl Translator {
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn PreferenceStore>) -> Self {
        Self {
            source,
            store,
            catalogs: HashMap::new(),
            reports: HashMap::new(),
            active: Locale::fallback(),
            metrics: CatalogMetrics::new(),
        }
    }

    pub fn active(&self) -> Locale {
        self.active
    }

    pub fn is_loaded(&self, locale: Locale) -> bool {
        self.catalogs.contains_key(&locale)
    }

    pub fn metrics(&self) -> &CatalogMetrics {
        &self.metrics
    }

    /// Pick the startup locale: saved preference, then the system language,
    /// then the default.
    pub async fn initialize(
        &mut self,
        system_language: Option<&str>,
        page: &mut Page,
    ) -> SelectOutcome {
        let saved = match self.store.get(PREFERRED_LOCALE_KEY).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Ignoring saved locale preference: {}", e);
                None
            }
        };

        if let Some(locale) = saved.as_deref().and_then(|code| Locale::from_code(code).ok()) {
            debug!("Using saved locale preference '{}'", locale);
            return self.select(locale, page).await;
        }

        let detected = system_language
            .and_then(Locale::from_language_tag)
            .unwrap_or_else(Locale::fallback);
        debug!("Using detected locale '{}'", detected);
        self.select(detected, page).await
    }

    /// Switch the page to `code`. Unsupported codes select the default locale.
    ///
    /// Never returns an error: load failures fall back to the default locale,
    /// or leave the page untranslated if even that fails.
    pub async fn select_locale(&mut self, code: &str, page: &mut Page) -> SelectOutcome {
        let locale = match Locale::from_code(code) {
            Ok(locale) => locale,
            Err(e) => {
                let fallback = Locale::fallback();
                warn!("{}, using '{}'", e, fallback);
                fallback
            }
        };
        self.select(locale, page).await
    }

    async fn select(&mut self, requested: Locale, page: &mut Page) -> SelectOutcome {
        let fallback = Locale::fallback();
        let mut candidate = requested;

        loop {
            page.set_active_locale_button(candidate);

            if self.ensure_loaded(candidate).await {
                break;
            }

            if candidate == fallback {
                error!("Default catalog unavailable, page left untranslated");
                return SelectOutcome::Untranslated { requested };
            }

            if self.is_loaded(fallback) {
                // Cached default: show it without touching the saved preference.
                self.active = fallback;
                page.set_active_locale_button(fallback);
                self.render(page);
                return SelectOutcome::FellBack {
                    requested,
                    active: fallback,
                };
            }

            candidate = fallback;
        }

        self.active = candidate;
        self.render(page);

        if let Err(e) = self.store.set(PREFERRED_LOCALE_KEY, candidate.code()).await {
            warn!("Failed to save locale preference: {}", e);
        }
        page.set_lang(candidate.code());

        if candidate == requested {
            info!("Locale set to {} ({})", candidate.name(), candidate);
            SelectOutcome::Selected(candidate)
        } else {
            SelectOutcome::FellBack {
                requested,
                active: candidate,
            }
        }
    }

    /// Make sure the catalog for `locale` is cached. Returns false on failure.
    async fn ensure_loaded(&mut self, locale: Locale) -> bool {
        if self.is_loaded(locale) {
            self.metrics.record_cache_hit();
            return true;
        }
        self.metrics.record_cache_miss();
        self.metrics.record_fetch();

        match self.source.fetch(locale).await {
            Ok(catalog) => {
                info!(
                    "Loaded {} catalog entries from {}",
                    catalog.len(),
                    self.source.describe(locale)
                );
                self.catalogs.insert(locale, catalog);
                self.validate_loaded(locale);
                true
            }
            Err(e) => {
                self.metrics.record_fetch_failure();
                error!("Error loading language file: {}", e);
                false
            }
        }
    }

    /// Check a newly cached catalog against the default one. When the default
    /// itself just arrived, every catalog cached before it is checked instead.
    fn validate_loaded(&mut self, locale: Locale) {
        let fallback = Locale::fallback();
        let pending: Vec<Locale> = if locale == fallback {
            self.catalogs
                .keys()
                .copied()
                .filter(|cached| *cached != fallback && !self.reports.contains_key(cached))
                .collect()
        } else {
            vec![locale]
        };

        let Some(reference) = self.catalogs.get(&fallback) else {
            return;
        };

        for candidate in pending {
            let Some(catalog) = self.catalogs.get(&candidate) else {
                continue;
            };
            let report = CatalogValidator::validate(reference, catalog);
            if report.has_errors() {
                warn!(
                    "Catalog validation errors for {} ({}): {:?}",
                    candidate.name(),
                    candidate,
                    report.errors
                );
            }
            if report.has_warnings() {
                warn!(
                    "Catalog validation warnings for {} ({}): {:?}",
                    candidate.name(),
                    candidate,
                    report.warnings
                );
            }
            self.reports.insert(candidate, report);
        }
    }

    /// Result of checking `locale`'s catalog against the default, once both
    /// have been loaded.
    pub fn validation_report(&self, locale: Locale) -> Option<&ValidationReport> {
        self.reports.get(&locale)
    }

    /// Apply the active catalog to every tagged node on the page.
    ///
    /// Nodes whose key is missing keep their current text.
    pub fn render(&self, page: &mut Page) {
        let Some(catalog) = self.catalogs.get(&self.active) else {
            error!("No translations loaded for {}", self.active);
            return;
        };

        page.translate_tagged(catalog);

        let expanded = page.is_more_info_expanded();
        page.set_more_info_label(catalog_label(catalog, expanded));

        if let Some(title) = catalog.get(PAGE_TITLE_KEY) {
            page.set_title(title);
        }
    }

    /// Active value for `key`, else the default locale's, else `key` itself.
    pub fn lookup<'a>(&'a self, key: &'a str) -> &'a str {
        self.find(key).unwrap_or(key)
    }

    /// Label for the more-info button in the given panel state.
    pub fn more_info_label(&self, expanded: bool) -> &str {
        let (key, builtin) = more_info_keys(expanded);
        self.find(key).unwrap_or(builtin)
    }

    fn find(&self, key: &str) -> Option<&str> {
        self.catalogs
            .get(&self.active)
            .and_then(|catalog| catalog.get(key))
            .or_else(|| {
                self.catalogs
                    .get(&Locale::fallback())
                    .and_then(|catalog| catalog.get(key))
            })
    }
}

fn more_info_keys(expanded: bool) -> (&'static str, &'static str) {
    if expanded {
        (SHOW_LESS_KEY, BUILTIN_SHOW_LESS)
    } else {
        (SHOW_MORE_KEY, BUILTIN_SHOW_MORE)
    }
}

fn catalog_label(catalog: &Catalog, expanded: bool) -> &str {
    let (key, builtin) = more_info_keys(expanded);
    catalog.get(key).unwrap_or(builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::EmbeddedCatalogSource;
    use crate::page::ids;
    use crate::storage::MemoryPreferenceStore;

    const EN: &str = r#"{"show-more": "MORE", "show-less": "LESS", "page-title": "Speed", "your-speed": "Your speed"}"#;
    const IT: &str = r#"{"show-more": "DI PIÙ", "show-less": "DI MENO", "page-title": "Velocità"}"#;

    fn translator_with(source: EmbeddedCatalogSource) -> (Translator, Arc<MemoryPreferenceStore>) {
        let store = Arc::new(MemoryPreferenceStore::new());
        let translator = Translator::new(Arc::new(source), store.clone());
        (translator, store)
    }

    fn both() -> EmbeddedCatalogSource {
        EmbeddedCatalogSource::empty()
            .with_document(Locale::ENGLISH, EN)
            .with_document(Locale::ITALIAN, IT)
    }

    async fn saved(store: &MemoryPreferenceStore) -> Option<String> {
        store.get(PREFERRED_LOCALE_KEY).await.unwrap()
    }

    // ==================== Selection Tests ====================

    #[tokio::test]
    async fn test_select_supported_locale() {
        let (mut translator, store) = translator_with(both());
        let mut page = Page::standard();

        let outcome = translator.select_locale("it", &mut page).await;

        assert_eq!(outcome, SelectOutcome::Selected(Locale::ITALIAN));
        assert_eq!(translator.active(), Locale::ITALIAN);
        assert_eq!(page.lang(), "it");
        assert_eq!(page.title(), "Velocità");
        assert_eq!(page.active_locale_button(), Some(Locale::ITALIAN));
        assert_eq!(saved(&store).await.as_deref(), Some("it"));
    }

    #[tokio::test]
    async fn test_unsupported_code_coerces_to_default() {
        let (mut translator, store) = translator_with(both());
        let mut page = Page::standard();

        let outcome = translator.select_locale("fr", &mut page).await;

        assert_eq!(outcome, SelectOutcome::Selected(Locale::ENGLISH));
        assert_eq!(translator.active(), Locale::ENGLISH);
        assert_eq!(saved(&store).await.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_reselect_uses_cache() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        translator.select_locale("it", &mut page).await;
        translator.select_locale("it", &mut page).await;

        assert_eq!(translator.metrics().fetches(), 1);
        assert_eq!(translator.metrics().cache_hits(), 1);
        assert_eq!(translator.active(), Locale::ITALIAN);
    }

    #[tokio::test]
    async fn test_failed_locale_falls_back_to_cached_default() {
        let source = EmbeddedCatalogSource::empty().with_document(Locale::ENGLISH, EN);
        let (mut translator, store) = translator_with(source);
        let mut page = Page::standard();

        translator.select_locale("en", &mut page).await;
        let outcome = translator.select_locale("it", &mut page).await;

        assert_eq!(
            outcome,
            SelectOutcome::FellBack {
                requested: Locale::ITALIAN,
                active: Locale::ENGLISH
            }
        );
        assert_eq!(translator.active(), Locale::ENGLISH);
        assert_eq!(page.title(), "Speed");
        assert_eq!(saved(&store).await.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_failed_locale_loads_default_when_not_cached() {
        let source = EmbeddedCatalogSource::empty().with_document(Locale::ENGLISH, EN);
        let (mut translator, store) = translator_with(source);
        let mut page = Page::standard();

        let outcome = translator.select_locale("it", &mut page).await;

        assert_eq!(outcome.active(), Some(Locale::ENGLISH));
        assert!(translator.is_loaded(Locale::ENGLISH));
        assert!(!translator.is_loaded(Locale::ITALIAN));
        assert_eq!(page.lang(), "en");
        assert_eq!(saved(&store).await.as_deref(), Some("en"));
        assert_eq!(translator.metrics().fetch_failures(), 1);
    }

    #[tokio::test]
    async fn test_everything_failing_leaves_page_untranslated() {
        let (mut translator, store) = translator_with(EmbeddedCatalogSource::empty());
        let mut page = Page::standard();
        let before = page.text(ids::MORE_INFO_BUTTON).map(str::to_string);

        let outcome = translator.select_locale("it", &mut page).await;

        assert_eq!(
            outcome,
            SelectOutcome::Untranslated {
                requested: Locale::ITALIAN
            }
        );
        assert_eq!(outcome.active(), None);
        assert_eq!(page.text(ids::MORE_INFO_BUTTON).map(str::to_string), before);
        assert_eq!(saved(&store).await, None);
    }

    // ==================== Initialization Tests ====================

    #[tokio::test]
    async fn test_initialize_prefers_saved_locale() {
        let store = Arc::new(MemoryPreferenceStore::new().with_value(PREFERRED_LOCALE_KEY, "it"));
        let mut translator = Translator::new(Arc::new(both()), store);
        let mut page = Page::standard();

        let outcome = translator.initialize(Some("en_US.UTF-8"), &mut page).await;
        assert_eq!(outcome, SelectOutcome::Selected(Locale::ITALIAN));
    }

    #[tokio::test]
    async fn test_initialize_ignores_unsupported_saved_locale() {
        let store = Arc::new(MemoryPreferenceStore::new().with_value(PREFERRED_LOCALE_KEY, "de"));
        let mut translator = Translator::new(Arc::new(both()), store);
        let mut page = Page::standard();

        let outcome = translator.initialize(Some("it-IT"), &mut page).await;
        assert_eq!(outcome, SelectOutcome::Selected(Locale::ITALIAN));
    }

    #[tokio::test]
    async fn test_initialize_defaults_without_hints() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        let outcome = translator.initialize(Some("ja_JP"), &mut page).await;
        assert_eq!(outcome, SelectOutcome::Selected(Locale::ENGLISH));
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn test_lookup_chain() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        assert_eq!(translator.lookup("show-more"), "show-more");

        translator.select_locale("en", &mut page).await;
        translator.select_locale("it", &mut page).await;

        assert_eq!(translator.lookup("show-more"), "DI PIÙ");
        // Missing in Italian, present in English
        assert_eq!(translator.lookup("your-speed"), "Your speed");
        assert_eq!(translator.lookup("nope"), "nope");
    }

    #[tokio::test]
    async fn test_more_info_label_builtin_fallback() {
        let (translator, _store) = translator_with(both());
        assert_eq!(translator.more_info_label(false), "SHOW MORE INFO");
        assert_eq!(translator.more_info_label(true), "SHOW LESS INFO");
    }

    // ==================== Validation Tests ====================

    #[tokio::test]
    async fn test_catalog_loaded_before_default_is_validated_later() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        translator.select_locale("it", &mut page).await;
        assert!(translator.validation_report(Locale::ITALIAN).is_none());

        translator.select_locale("en", &mut page).await;

        let report = translator.validation_report(Locale::ITALIAN).unwrap();
        // Italian lacks "your-speed"
        assert!(report.has_errors());
        assert!(translator.validation_report(Locale::ENGLISH).is_none());
    }

    #[tokio::test]
    async fn test_catalog_loaded_after_default_is_validated_immediately() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        translator.select_locale("en", &mut page).await;
        translator.select_locale("it", &mut page).await;

        assert!(translator.validation_report(Locale::ITALIAN).is_some());
    }

    #[tokio::test]
    async fn test_bundled_catalogs_validate_clean() {
        let mut translator = Translator::new(
            Arc::new(EmbeddedCatalogSource::bundled()),
            Arc::new(MemoryPreferenceStore::new()),
        );
        let mut page = Page::standard();

        translator.initialize(Some("it_IT.UTF-8"), &mut page).await;
        translator.select_locale("en", &mut page).await;

        assert!(translator
            .validation_report(Locale::ITALIAN)
            .unwrap()
            .is_clean());
    }

    // ==================== Render Tests ====================

    #[tokio::test]
    async fn test_render_keeps_missing_keys() {
        let source = EmbeddedCatalogSource::empty()
            .with_document(Locale::ENGLISH, r#"{"your-speed": "Your speed"}"#);
        let (mut translator, _store) = translator_with(source);
        let mut page = Page::standard();

        translator.select_locale("en", &mut page).await;

        assert_eq!(page.text(ids::YOUR_SPEED_LABEL), Some("Your speed"));
        assert_eq!(page.text(ids::RESTART_HINT), Some("restart-hint"));
        assert_eq!(page.text(ids::MORE_INFO_BUTTON), Some("SHOW MORE INFO"));
        assert_eq!(page.text(ids::DOWNLOAD_SPEED), Some("0"));
    }

    #[tokio::test]
    async fn test_render_respects_expanded_panel() {
        let (mut translator, _store) = translator_with(both());
        let mut page = Page::standard();

        translator.select_locale("en", &mut page).await;
        page.toggle_more_info(&translator);
        translator.select_locale("it", &mut page).await;

        assert_eq!(page.text(ids::MORE_INFO_BUTTON), Some("DI MENO"));
    }
}
