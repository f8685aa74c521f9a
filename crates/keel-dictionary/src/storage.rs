//! Loading and storing dictionary text.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::DictionaryResult;

/// Where the persisted type dictionary text lives.
pub trait DictionaryStorage: Send + Sync {
    /// The stored text, or `None` if nothing was stored yet.
    fn load_type_dictionary(&self) -> DictionaryResult<Option<String>>;

    /// Replace the stored text.
    fn store_type_dictionary(&self, text: &str) -> DictionaryResult<()>;
}

/// Dictionary text held in memory.
#[derive(Debug, Default)]
pub struct InMemoryDictionaryStorage {
    text: Mutex<Option<String>>,
}

impl InMemoryDictionaryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(Some(text.into())),
        }
    }
}

impl DictionaryStorage for InMemoryDictionaryStorage {
    fn load_type_dictionary(&self) -> DictionaryResult<Option<String>> {
        Ok(self.text.lock().clone())
    }

    fn store_type_dictionary(&self, text: &str) -> DictionaryResult<()> {
        *self.text.lock() = Some(text.to_string());
        Ok(())
    }
}

/// Dictionary text in a file, replaced atomically on every store.
#[derive(Debug)]
pub struct FileDictionaryStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileDictionaryStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DictionaryStorage for FileDictionaryStorage {
    fn load_type_dictionary(&self) -> DictionaryResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store_type_dictionary(&self, text: &str) -> DictionaryResult<()> {
        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(text.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), bytes = text.len(), "type dictionary stored");
        Ok(())
    }
}
