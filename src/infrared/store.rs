//! Persisted signal-code store.
//!
//! A flat JSON object mapping button names to raw IR code strings, read
//! fully into memory per operation. Mutations rewrite the whole file
//! atomically: the new contents go to a temp file in the same directory,
//! which is then renamed over the store, so a crash mid-write leaves either
//! the old or the new file, never a torn one.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Failures of the on-disk store. Surfaced to clients as internal errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access signal store: {0}")]
    Io(#[from] std::io::Error),

    #[error("signal store is corrupt: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Name → raw code store backed by one JSON file.
pub struct SignalStore {
    path: PathBuf,
}

impl SignalStore {
    /// Store file inside `database_dir`. The directory is created lazily on
    /// first write.
    pub fn new<P: AsRef<Path>>(database_dir: P) -> Self {
        Self {
            path: database_dir.as_ref().join("ir_codes.json"),
        }
    }

    /// Read the full store. A missing file is an empty store.
    pub fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Saved button names, in stable order.
    pub fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.into_keys().collect())
    }

    pub fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.remove(name))
    }

    /// Insert or overwrite one entry.
    pub fn insert(&self, name: &str, code: &str) -> Result<(), StoreError> {
        let mut codes = self.load()?;
        codes.insert(name.to_string(), code.to_string());
        self.persist(&codes)
    }

    /// Remove one entry. Returns false when the name was not present.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let mut codes = self.load()?;
        if codes.remove(name).is_none() {
            return Ok(false);
        }
        self.persist(&codes)?;
        Ok(true)
    }

    /// Move the payload from `old` to `new` in a single rewrite, so there
    /// is no observable state where both or neither name exists. Returns
    /// false when `old` was not present.
    pub fn rename(&self, old: &str, new: &str) -> Result<bool, StoreError> {
        let mut codes = self.load()?;
        let Some(code) = codes.remove(old) else {
            return Ok(false);
        };
        codes.insert(new.to_string(), code);
        self.persist(&codes)?;
        Ok(true)
    }

    fn persist(&self, codes: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(serde_json::to_string_pretty(codes)?.as_bytes())?;
        tmp.persist(&self.path).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}
