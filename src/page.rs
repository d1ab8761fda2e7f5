//! In-memory document model of the speed test page.
//!
//! Elements are addressed by id. Some carry a translation key; the translator
//! rewrites their text. The page is also the sequencer's `DisplaySink`.

use crate::i18n::{Catalog, Locale, LocaleRegistry, Translator};
use crate::speedtest::{DisplaySink, TestResult, TestState};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Element ids of the standard layout.
pub mod ids {
    pub const LOADING: &str = "loading";
    pub const LOADING_TEXT: &str = "loading-text";
    pub const RESULT: &str = "result";
    pub const YOUR_SPEED_LABEL: &str = "your-speed-label";
    pub const DOWNLOAD_SPEED: &str = "download-speed";
    pub const DOWNLOAD_UNIT: &str = "download-unit";
    pub const ERROR_MESSAGE: &str = "error-message";
    pub const MORE_INFO_BUTTON: &str = "more-info-btn";
    pub const ADDITIONAL_METRICS: &str = "additional-metrics";
    pub const LATENCY_LABEL: &str = "latency-label";
    pub const UNLOADED_LABEL: &str = "unloaded-label";
    pub const LATENCY_UNLOADED: &str = "latency-unloaded";
    pub const LOADED_LABEL: &str = "loaded-label";
    pub const LATENCY_LOADED: &str = "latency-loaded";
    pub const LATENCY_UNIT: &str = "latency-unit";
    pub const UPLOAD_LABEL: &str = "upload-label";
    pub const UPLOAD_SPEED: &str = "upload-speed";
    pub const UPLOAD_UNIT: &str = "upload-unit";
    pub const RESTART_HINT: &str = "restart-hint";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Translation key, if the text is localized
    pub i18n_key: Option<String>,
    pub text: String,
    pub visible: bool,
    /// Only meaningful for collapsible panels
    pub expanded: bool,
}

impl Element {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            i18n_key: None,
            text: text.into(),
            visible: true,
            expanded: false,
        }
    }

    /// A localized node whose placeholder text is its key.
    pub fn tagged(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            text: key.clone(),
            i18n_key: Some(key),
            visible: true,
            expanded: false,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    elements: BTreeMap<String, Element>,
    title: String,
    lang: String,
    active_locale_button: Option<Locale>,
    state: TestState,
}

impl Page {
    /// An empty page.
    pub fn new() -> Self {
        Self {
            elements: BTreeMap::new(),
            title: String::new(),
            lang: Locale::fallback().code().to_string(),
            active_locale_button: None,
            state: TestState::Idle,
        }
    }

    /// The speed test layout: loading indicator, result panel, more-info panel.
    pub fn standard() -> Self {
        let mut page = Self::new();
        page.title = "speedcheck".to_string();

        page.insert(ids::LOADING, Element::text(""));
        page.insert(ids::LOADING_TEXT, Element::tagged("loading-text"));

        page.insert(ids::RESULT, Element::text("").hidden());
        page.insert(ids::YOUR_SPEED_LABEL, Element::tagged("your-speed"));
        page.insert(ids::DOWNLOAD_SPEED, Element::text("0"));
        page.insert(ids::DOWNLOAD_UNIT, Element::tagged("speed-unit"));
        page.insert(ids::ERROR_MESSAGE, Element::tagged("test-error").hidden());
        page.insert(ids::RESTART_HINT, Element::tagged("restart-hint"));

        page.insert(ids::MORE_INFO_BUTTON, Element::tagged("show-more"));
        page.insert(ids::ADDITIONAL_METRICS, Element::text(""));
        page.insert(ids::LATENCY_LABEL, Element::tagged("latency-label"));
        page.insert(ids::UNLOADED_LABEL, Element::tagged("unloaded-label"));
        page.insert(ids::LATENCY_UNLOADED, Element::text("0"));
        page.insert(ids::LOADED_LABEL, Element::tagged("loaded-label"));
        page.insert(ids::LATENCY_LOADED, Element::text("0"));
        page.insert(ids::LATENCY_UNIT, Element::tagged("latency-unit"));
        page.insert(ids::UPLOAD_LABEL, Element::tagged("upload-label"));
        page.insert(ids::UPLOAD_SPEED, Element::text("0"));
        page.insert(ids::UPLOAD_UNIT, Element::tagged("speed-unit"));

        page
    }

    pub fn insert(&mut self, id: impl Into<String>, element: Element) {
        self.elements.insert(id.into(), element);
    }

    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.elements.get(id).map(|el| el.text.as_str())
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.elements.get(id).map(|el| el.visible).unwrap_or(false)
    }

    /// (id, key, text) of every localized element.
    pub fn tagged(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.elements.iter().filter_map(|(id, el)| {
            el.i18n_key
                .as_deref()
                .map(|key| (id.as_str(), key, el.text.as_str()))
        })
    }

    /// Replace the text of every tagged element whose key the catalog defines.
    pub fn translate_tagged(&mut self, catalog: &Catalog) {
        for element in self.elements.values_mut() {
            if let Some(key) = &element.i18n_key {
                if let Some(value) = catalog.get(key) {
                    element.text = value.to_string();
                }
            }
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }

    /// Declared document language.
    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn set_lang(&mut self, code: &str) {
        self.lang = code.to_string();
    }

    pub fn active_locale_button(&self) -> Option<Locale> {
        self.active_locale_button
    }

    pub fn set_active_locale_button(&mut self, locale: Locale) {
        self.active_locale_button = Some(locale);
    }

    /// Last sequencer state shown on the page.
    pub fn test_state(&self) -> TestState {
        self.state
    }

    pub fn is_more_info_expanded(&self) -> bool {
        self.elements
            .get(ids::ADDITIONAL_METRICS)
            .map(|el| el.expanded)
            .unwrap_or(false)
    }

    pub fn set_more_info_label(&mut self, label: &str) {
        self.set_text(ids::MORE_INFO_BUTTON, label);
    }

    /// Flip the auxiliary metrics panel and relabel its button.
    pub fn toggle_more_info(&mut self, translator: &Translator) {
        let expanded = !self.is_more_info_expanded();
        self.set_more_info(expanded, translator.more_info_label(expanded));
    }

    fn set_more_info(&mut self, expanded: bool, label: &str) {
        if let Some(panel) = self.elements.get_mut(ids::ADDITIONAL_METRICS) {
            panel.expanded = expanded;
        }
        self.set_more_info_label(label);
    }

    fn set_text(&mut self, id: &str, text: &str) {
        if let Some(el) = self.elements.get_mut(id) {
            el.text = text.to_string();
        }
    }

    fn set_visible(&mut self, id: &str, visible: bool) {
        if let Some(el) = self.elements.get_mut(id) {
            el.visible = visible;
        }
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let text = |id: &str| self.text(id).unwrap_or("");
        let mut out = String::new();

        let locales: Vec<String> = LocaleRegistry::get()
            .list_enabled()
            .iter()
            .map(|config| {
                if self.active_locale_button.map(|l| l.code()) == Some(config.code) {
                    format!("[{}]", config.code.to_ascii_uppercase())
                } else {
                    config.code.to_string()
                }
            })
            .collect();
        let _ = writeln!(out, "== {} == ({})", self.title, locales.join(" "));

        if self.is_visible(ids::LOADING) {
            let _ = writeln!(out, "{}", text(ids::LOADING_TEXT));
        }

        if self.is_visible(ids::RESULT) {
            let _ = writeln!(
                out,
                "{} {} {}",
                text(ids::YOUR_SPEED_LABEL),
                text(ids::DOWNLOAD_SPEED),
                text(ids::DOWNLOAD_UNIT)
            );
            if self.is_visible(ids::ERROR_MESSAGE) {
                let _ = writeln!(out, "! {}", text(ids::ERROR_MESSAGE));
            }
            let _ = writeln!(out, "[{}]", text(ids::MORE_INFO_BUTTON));

            if self.is_more_info_expanded() {
                let _ = writeln!(
                    out,
                    "  {}: {} {} {} / {} {} {}",
                    text(ids::LATENCY_LABEL),
                    text(ids::UNLOADED_LABEL),
                    text(ids::LATENCY_UNLOADED),
                    text(ids::LATENCY_UNIT),
                    text(ids::LOADED_LABEL),
                    text(ids::LATENCY_LOADED),
                    text(ids::LATENCY_UNIT)
                );
                let _ = writeln!(
                    out,
                    "  {}: {} {}",
                    text(ids::UPLOAD_LABEL),
                    text(ids::UPLOAD_SPEED),
                    text(ids::UPLOAD_UNIT)
                );
            }

            if self.state.is_terminal() {
                let _ = writeln!(out, "{}", text(ids::RESTART_HINT));
            }
        }

        out
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::standard()
    }
}

fn format_speed(mbps: f64) -> String {
    format!("{:.1}", mbps)
}

fn format_latency(ms: f64) -> String {
    format!("{}", ms.round() as i64)
}

/// Measured value, or "0" for a field that was never measured.
fn or_zero(value: f64, format: fn(f64) -> String) -> String {
    if value > 0.0 {
        format(value)
    } else {
        "0".to_string()
    }
}

impl DisplaySink for Page {
    fn set_download(&mut self, mbps: f64) {
        self.set_text(ids::DOWNLOAD_SPEED, &format_speed(mbps));
    }

    fn set_upload(&mut self, mbps: f64) {
        self.set_text(ids::UPLOAD_SPEED, &format_speed(mbps));
    }

    fn set_latency_unloaded(&mut self, ms: f64) {
        self.set_text(ids::LATENCY_UNLOADED, &format_latency(ms));
    }

    fn set_latency_loaded(&mut self, ms: f64) {
        self.set_text(ids::LATENCY_LOADED, &format_latency(ms));
    }

    fn reset(&mut self) {
        for id in [
            ids::DOWNLOAD_SPEED,
            ids::UPLOAD_SPEED,
            ids::LATENCY_UNLOADED,
            ids::LATENCY_LOADED,
        ] {
            self.set_text(id, "0");
        }
    }

    fn show_loading(&mut self) {
        self.set_visible(ids::RESULT, false);
        self.set_visible(ids::ERROR_MESSAGE, false);
        self.set_visible(ids::LOADING, true);
    }

    fn show_result(&mut self) {
        self.set_visible(ids::LOADING, false);
        self.set_visible(ids::RESULT, true);
    }

    fn show_error(&mut self, partial: &TestResult) {
        self.set_visible(ids::LOADING, false);
        self.set_visible(ids::RESULT, true);
        self.set_visible(ids::ERROR_MESSAGE, true);

        self.set_text(
            ids::DOWNLOAD_SPEED,
            &or_zero(partial.download_mbps, format_speed),
        );
        self.set_text(ids::UPLOAD_SPEED, &or_zero(partial.upload_mbps, format_speed));
        self.set_text(
            ids::LATENCY_UNLOADED,
            &or_zero(partial.latency_unloaded_ms, format_latency),
        );
        self.set_text(
            ids::LATENCY_LOADED,
            &or_zero(partial.latency_loaded_ms, format_latency),
        );
    }

    fn collapse_more_info(&mut self, label: &str) {
        self.set_more_info(false, label);
    }

    fn state_changed(&mut self, state: TestState) {
        self.state = state;
    }
}
