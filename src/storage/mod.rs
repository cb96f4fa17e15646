//! App-state storage
//!
//! Persists the selection, the navigation history and per-session drafts
//! as a single JSON file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;

use crate::ui_backend::{AppStateStore, PersistedAppState, StorageError};

/// JSON file backed app-state store
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state; `Ok(None)` if the file does not exist yet
    pub fn load_sync(&self) -> Result<Option<PersistedAppState>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write state via a uniquely named sibling temp file so readers never
    /// see a torn file and overlapping saves never share a temp path
    pub fn save_sync(&self, state: &PersistedAppState) -> Result<(), StorageError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(state)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}

#[async_trait]
impl AppStateStore for JsonStateStore {
    async fn save(&self, state: &PersistedAppState) -> Result<(), StorageError> {
        self.save_sync(state)
    }

    async fn load(&self) -> Result<Option<PersistedAppState>, StorageError> {
        self.load_sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_as_none() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("state.json"));
        assert!(store.load_sync().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("nested").join("state.json"));
        let mut state = PersistedAppState {
            selection: Some("session:s1".into()),
            history: vec!["workspace:w".into(), "session:s1".into()],
            history_cursor: 1,
            ..Default::default()
        };
        state.drafts.insert("s1".into(), "draft".into());

        store.save_sync(&state).unwrap();
        assert_eq!(store.load_sync().unwrap(), Some(state));
        let leftovers = std::fs::read_dir(temp.path().join("nested")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn overlapping_saves_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let store = JsonStateStore::new(temp.path().join("state.json"));

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for round in 0..25 {
                        let state = PersistedAppState {
                            selection: Some(format!("session:w{}-{}", worker, round)),
                            ..Default::default()
                        };
                        store.save_sync(&state)?;
                    }
                    Ok::<_, StorageError>(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap().unwrap();
        }

        let state = store.load_sync().unwrap().unwrap();
        assert!(state.selection.unwrap().starts_with("session:w"));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = JsonStateStore::new(path);
        assert!(matches!(
            store.load_sync(),
            Err(StorageError::InvalidStateFile(_))
        ));
    }

    #[test]
    fn unknown_fields_default() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.json");
        std::fs::write(&path, r#"{"selection":"session:x"}"#).unwrap();
        let state = JsonStateStore::new(path).load_sync().unwrap().unwrap();
        assert_eq!(state.selection.as_deref(), Some("session:x"));
        assert!(state.history.is_empty());
    }
}
