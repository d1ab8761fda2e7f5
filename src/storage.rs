//! Durable client-side preferences, a tiny string key/value store.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

/// Key under which the chosen locale code is stored
pub const PREFERRED_LOCALE_KEY: &str = "preferredLanguage";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access preferences at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Preferences at {path} are not a JSON object of strings: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// String key/value preferences that outlive a single run.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Preferences kept as a JSON object in a single file.
///
/// A missing file reads as empty. Every `set` rewrites the whole file.
#[derive(Debug)]
pub struct FilePreferenceStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Existing values to merge a write into. Only a corrupt file is discarded;
/// any other read failure aborts the write so the file is left alone.
fn writable_base(
    existing: Result<BTreeMap<String, String>, StorageError>,
) -> Result<BTreeMap<String, String>, StorageError> {
    match existing {
        Ok(values) => Ok(values),
        Err(e @ StorageError::Corrupt { .. }) => {
            warn!("Replacing unreadable preferences: {}", e);
            Ok(BTreeMap::new())
        }
        Err(e) => Err(e),
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let mut values = writable_base(self.read_all().await)?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_string_pretty(&values).map_err(|source| {
            StorageError::Corrupt {
                path: self.path.clone(),
                source,
            }
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| self.io_error(e))
    }
}

/// Process-local preferences, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a value, as if saved by an earlier session.
    pub fn with_value(self, key: &str, value: &str) -> Self {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
