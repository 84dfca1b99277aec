use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::platform::{DurableStore, PlatformError};

/// File-backed durable store. Each key maps to one file under the base
/// directory; writes go through a temp file and rename so a replaced payload
/// is either the old bytes or the new bytes, never a torn mix.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }

    fn read_key(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("unable to read store file {}", path.display())),
        }
    }

    fn write_key(&self, path: &Path, value: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!("unable to create store directory {}", self.base_dir.display())
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)
            .with_context(|| format!("unable to write store file {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("unable to replace store file {}", path.display()))?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        self.read_key(&self.path_for(key))
            .map_err(|err| PlatformError::Storage(format!("{err:#}")))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PlatformError> {
        self.write_key(&self.path_for(key), value)
            .map_err(|err| PlatformError::Storage(format!("{err:#}")))
    }
}

/// In-process store for hosts without a filesystem and for tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PlatformError> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), PlatformError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
