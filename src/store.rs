use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::debug;

use crate::error::PersistenceError;
use crate::models::Block;

/// Durable snapshot of the whole chain. `load` never validates.
pub trait ChainStore: Send + Sync {
    /// `Ok(None)` when no ledger has been saved yet.
    fn load(&self) -> Result<Option<Vec<Block>>, PersistenceError>;
    /// Overwrites any previous snapshot.
    fn save(&self, chain: &[Block]) -> Result<(), PersistenceError>;
}

/// The chain as one pretty-printed JSON array on disk.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChainStore for JsonFileStore {
    fn load(&self) -> Result<Option<Vec<Block>>, PersistenceError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let blocks: Vec<Block> = serde_json::from_str(&contents)?;
        debug!("Loaded {} blocks from {}", blocks.len(), self.path.display());
        Ok(Some(blocks))
    }

    fn save(&self, chain: &[Block]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let blocks_json = serde_json::to_string_pretty(chain)?;
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&tmp_path)?;
        file.write_all(blocks_json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Keeps the snapshot in process memory. Used by `--in-memory` nodes and
/// tests.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<Option<Vec<Block>>>,
    #[cfg(test)]
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chain(chain: Vec<Block>) -> Self {
        Self {
            blocks: Mutex::new(Some(chain)),
            ..Self::default()
        }
    }

    /// Makes every later save return an I/O error.
    #[cfg(test)]
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<Vec<Block>> {
        self.blocks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl ChainStore for MemoryStore {
    fn load(&self) -> Result<Option<Vec<Block>>, PersistenceError> {
        Ok(self.saved())
    }

    fn save(&self, chain: &[Block]) -> Result<(), PersistenceError> {
        #[cfg(test)]
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "store unavailable").into());
        }
        *self.blocks.lock().unwrap_or_else(|e| e.into_inner()) = Some(chain.to_vec());
        Ok(())
    }
}
