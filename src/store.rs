//! Key/value persistence for editor preferences.
//!
//! Values are stored as JSON text, one entry per key, so a corrupt or
//! hand-edited entry only affects the key it belongs to.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const KEY_THEME: &str = "theme";
pub const KEY_DIAGRAM_KIND: &str = "diagramType";
pub const KEY_NATURAL_TEXT: &str = "naturalText";
pub const KEY_DIAGRAM_SOURCE: &str = "mermaidCode";

/// Raw string storage underneath a [`PreferenceStore`].
pub trait StorageBackend {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&mut self, key: &str, value: String);
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, raw: &str) -> Self {
        self.entries.insert(key.to_string(), raw.to_string());
        self
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
    }
}

/// A JSON object on disk, rewritten after every write.
///
/// An unreadable or malformed file is treated as empty.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileBackend {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) if !content.trim().is_empty() => {
                serde_json::from_str(&content).unwrap_or_else(|e| {
                    warn!(path = %path.display(), error = %e, "ignoring unreadable preferences file");
                    BTreeMap::new()
                })
            }
            Ok(_) => BTreeMap::new(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no preferences file yet");
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    fn flush(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, json)
    }
}

impl StorageBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: String) {
        self.entries.insert(key.to_string(), value);
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "failed to save preferences");
        }
    }
}

/// Typed access to a [`StorageBackend`].
pub struct PreferenceStore<B> {
    backend: B,
}

impl<B: StorageBackend> PreferenceStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Stored value for `key`, or `default` when the entry is missing or
    /// does not deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let Some(raw) = self.backend.read(key) else {
            return default;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "falling back to default preference");
                default
            }
        }
    }

    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.write(key, raw),
            Err(e) => warn!(key, error = %e, "failed to serialize preference"),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::DiagramKind;
    use crate::theme::Theme;

    #[test]
    fn missing_key_returns_default() {
        let store = PreferenceStore::new(MemoryBackend::new());
        assert_eq!(store.get(KEY_THEME, Theme::Light), Theme::Light);
        assert_eq!(store.get(KEY_NATURAL_TEXT, "x".to_string()), "x");
    }

    #[test]
    fn set_is_visible_to_next_get() {
        let mut store = PreferenceStore::new(MemoryBackend::new());
        store.set(KEY_DIAGRAM_KIND, &DiagramKind::Gantt);
        store.set(KEY_DIAGRAM_SOURCE, "gantt\ntitle X");

        assert_eq!(store.get(KEY_DIAGRAM_KIND, DiagramKind::Flowchart), DiagramKind::Gantt);
        assert_eq!(store.get(KEY_DIAGRAM_SOURCE, String::new()), "gantt\ntitle X");
    }

    #[test]
    fn corrupt_entry_falls_back_silently() {
        let backend = MemoryBackend::new()
            .with_entry(KEY_THEME, "{not json")
            .with_entry(KEY_DIAGRAM_KIND, "\"pie\"");
        let store = PreferenceStore::new(backend);

        assert_eq!(store.get(KEY_THEME, Theme::Dark), Theme::Dark);
        assert_eq!(store.get(KEY_DIAGRAM_KIND, DiagramKind::Flowchart), DiagramKind::Flowchart);
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let mut store = PreferenceStore::new(JsonFileBackend::open(&path));
        store.set(KEY_THEME, &Theme::Dark);
        store.set(KEY_NATURAL_TEXT, "hello");
        drop(store);

        let reopened = PreferenceStore::new(JsonFileBackend::open(&path));
        assert_eq!(reopened.get(KEY_THEME, Theme::Light), Theme::Dark);
        assert_eq!(reopened.get(KEY_NATURAL_TEXT, String::new()), "hello");
    }

    #[test]
    fn malformed_file_is_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = PreferenceStore::new(JsonFileBackend::open(&path));
        assert_eq!(store.get(KEY_THEME, Theme::Light), Theme::Light);
    }
}
