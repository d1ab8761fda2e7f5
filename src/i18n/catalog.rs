//! Locale catalogs and the places they are loaded from.
//!
//! A catalog is a flat JSON object mapping translation keys to strings:
//!
//! ```json
//! { "show-more": "SHOW MORE INFO", "page-title": "Internet Speed Test" }
//! ```

use crate::i18n::Locale;
use crate::retry::{with_retry_if, RetryConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Failure to obtain or decode a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog request for '{locale}' failed: {source}")]
    Request {
        locale: Locale,
        #[source]
        source: reqwest::Error,
    },

    #[error("Catalog server returned {status} for '{locale}'")]
    Status { locale: Locale, status: u16 },

    #[error("Invalid catalog for '{locale}': {source}")]
    Parse {
        locale: Locale,
        #[source]
        source: serde_json::Error,
    },

    #[error("No catalog available for '{0}'")]
    Missing(Locale),
}

impl CatalogError {
    /// Network errors, 429 and 5xx are worth retrying; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            CatalogError::Request { .. } => true,
            CatalogError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Immutable key -> string mapping for one locale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    locale: Locale,
    entries: HashMap<String, String>,
}

impl Catalog {
    pub fn new(locale: Locale, entries: HashMap<String, String>) -> Self {
        Self { locale, entries }
    }

    /// Parse a flat JSON object. Nested objects or non-string values are rejected.
    pub fn from_json(locale: Locale, json: &str) -> Result<Self, CatalogError> {
        let entries: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|source| CatalogError::Parse { locale, source })?;
        Ok(Self { locale, entries })
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Value for `key`. Empty strings count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Raw entries, including empty values.
    pub fn entries(&self) -> &HashMap<String, String> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Somewhere catalogs can be fetched from, addressed by locale code.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self, locale: Locale) -> Result<Catalog, CatalogError>;

    /// Human-readable location of a catalog, used in logs.
    fn describe(&self, locale: Locale) -> String;
}

/// Reads `{dir}/{code}.json` from disk.
#[derive(Debug, Clone)]
pub struct DirectoryCatalogSource {
    dir: PathBuf,
}

impl DirectoryCatalogSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, locale: Locale) -> PathBuf {
        self.dir.join(format!("{}.json", locale.code()))
    }
}

#[async_trait]
impl CatalogSource for DirectoryCatalogSource {
    async fn fetch(&self, locale: Locale) -> Result<Catalog, CatalogError> {
        let path = self.path_for(locale);
        let json = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
        Catalog::from_json(locale, &json)
    }

    fn describe(&self, locale: Locale) -> String {
        self.path_for(locale).display().to_string()
    }
}

/// Fetches `{base_url}/locales/{code}.json` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl HttpCatalogSource {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryConfig::catalog_fetch(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn url_for(&self, locale: Locale) -> String {
        format!("{}/locales/{}.json", self.base_url, locale.code())
    }

    async fn fetch_once(&self, locale: Locale) -> Result<Catalog, CatalogError> {
        let url = self.url_for(locale);
        debug!("Fetching catalog from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| CatalogError::Request { locale, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                locale,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| CatalogError::Request { locale, source })?;

        Catalog::from_json(locale, &body)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self, locale: Locale) -> Result<Catalog, CatalogError> {
        with_retry_if(
            &self.retry,
            &format!("Catalog fetch for {}", locale),
            || self.fetch_once(locale),
            CatalogError::is_retryable,
        )
        .await
    }

    fn describe(&self, locale: Locale) -> String {
        self.url_for(locale)
    }
}

/// Catalog documents held in memory, by default the ones shipped in `locales/`.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedCatalogSource {
    documents: HashMap<Locale, String>,
}

impl EmbeddedCatalogSource {
    /// The catalogs compiled into the binary.
    pub fn bundled() -> Self {
        Self::default()
            .with_document(Locale::ENGLISH, include_str!("../../locales/en.json"))
            .with_document(Locale::ITALIAN, include_str!("../../locales/it.json"))
    }

    /// No documents at all; every fetch fails.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, locale: Locale, json: impl Into<String>) -> Self {
        self.documents.insert(locale, json.into());
        self
    }
}

#[async_trait]
impl CatalogSource for EmbeddedCatalogSource {
    async fn fetch(&self, locale: Locale) -> Result<Catalog, CatalogError> {
        let json = self
            .documents
            .get(&locale)
            .ok_or(CatalogError::Missing(locale))?;
        Catalog::from_json(locale, json)
    }

    fn describe(&self, locale: Locale) -> String {
        format!("embedded:{}", locale.code())
    }
}
