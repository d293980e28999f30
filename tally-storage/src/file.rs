//! JSON-file storage implementation.
//!
//! Each collection lives in `<dir>/<key>.json`. Writes go to a temporary file
//! in the same directory and are renamed into place, so a reader never sees a
//! half-written collection.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::Value;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info};

use tally_core::{Error, Result};

use crate::traits::KvStore;

/// Directory-backed store.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    _temp: Option<TempDir>,
}

impl FileStore {
    /// Open or create a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        info!("Opening file store at {:?}", dir);
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            _temp: None,
        })
    }

    /// Open in a temporary directory that is removed when the store drops.
    pub fn open_temp() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let mut store = Self::open(temp.path())?;
        store._temp = Some(temp);
        Ok(store)
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::storage(format!("invalid collection key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileStore {
    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn set_value(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        let encoded = serde_json::to_vec_pretty(&value)?;

        let _guard = self.write_lock.lock();
        let mut tmp = NamedTempFile::new_in(&self.dir)
            .map_err(|e| Error::storage_write(e.to_string()))?;
        tmp.write_all(&encoded)
            .map_err(|e| Error::storage_write(e.to_string()))?;
        tmp.persist(&path)
            .map_err(|e| Error::storage_write(e.to_string()))?;

        debug!(key, bytes = encoded.len(), "Persisted collection");
        Ok(())
    }
}
