//! Persistent key → vector stores behind the embedding cache.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{EmbeddingEntry, EmbeddingError, EmbeddingKey, Result};

const FORMAT_VERSION: u32 = 1;

/// Outcome of reading a store. Reading never fails: an unreadable store is
/// reported as [`StoreLoad::Corrupt`] and the caller treats it as empty.
#[derive(Debug)]
pub enum StoreLoad {
    Loaded(BTreeMap<EmbeddingKey, EmbeddingEntry>),
    Missing,
    Corrupt(String),
}

impl StoreLoad {
    /// Entries if the store was readable, otherwise an empty map.
    pub fn into_entries(self) -> BTreeMap<EmbeddingKey, EmbeddingEntry> {
        match self {
            StoreLoad::Loaded(entries) => entries,
            StoreLoad::Missing | StoreLoad::Corrupt(_) => BTreeMap::new(),
        }
    }
}

/// Key/value persistence for embedding entries.
///
/// Guarantees:
/// - `load` never errors; absent keys are simply missing.
/// - `commit` is atomic for the whole batch: readers observe either none or
///   all of the committed entries.
/// - `commit` merges with what is already stored; it never drops entries
///   written by another process.
pub trait EmbeddingStore: Send + Sync {
    fn load(&self) -> StoreLoad;

    fn commit(&self, entries: &BTreeMap<EmbeddingKey, EmbeddingEntry>) -> Result<()>;

    /// Evict everything.
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: BTreeMap<EmbeddingKey, EmbeddingEntry>,
}

/// Single JSON file with whole-file atomic replace.
///
/// Layout: `{ "version": 1, "entries": { "<sha256 hex>": { "vector": [...], "dimension": N } } }`
/// with keys sorted, so the file is diffable between runs.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoreLoad {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoreLoad::Missing,
            Err(e) => return StoreLoad::Corrupt(format!("read {}: {e}", self.path.display())),
        };
        let file: CacheFile = match serde_json::from_slice(&raw) {
            Ok(file) => file,
            Err(e) => return StoreLoad::Corrupt(format!("parse {}: {e}", self.path.display())),
        };
        if file.version != FORMAT_VERSION {
            return StoreLoad::Corrupt(format!(
                "unsupported cache format version {} (expected {FORMAT_VERSION})",
                file.version
            ));
        }
        if let Some((key, _)) = file.entries.iter().find(|(_, e)| !e.is_consistent()) {
            return StoreLoad::Corrupt(format!("entry {} has inconsistent dimension", key.short()));
        }
        StoreLoad::Loaded(file.entries)
    }

    fn write_atomic(&self, file: &CacheFile) -> Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let body = serde_json::to_vec(file)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&body)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| EmbeddingError::Io(e.error))?;
        Ok(())
    }
}

impl EmbeddingStore for JsonFileStore {
    fn load(&self) -> StoreLoad {
        self.read()
    }

    fn commit(&self, entries: &BTreeMap<EmbeddingKey, EmbeddingEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        // A corrupt file is replaced rather than merged.
        let mut merged = self.read().into_entries();
        merged.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.write_atomic(&CacheFile {
            version: FORMAT_VERSION,
            entries: merged,
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Counts commits so tests can assert write batching.
#[derive(Debug, Default)]
pub struct MemoryEmbeddingStore {
    entries: Mutex<BTreeMap<EmbeddingKey, EmbeddingEntry>>,
    commits: AtomicUsize,
}

impl MemoryEmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-empty commits performed so far.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingStore for MemoryEmbeddingStore {
    fn load(&self) -> StoreLoad {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.is_empty() {
            StoreLoad::Missing
        } else {
            StoreLoad::Loaded(entries.clone())
        }
    }

    fn commit(&self, entries: &BTreeMap<EmbeddingKey, EmbeddingEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut stored = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        stored.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}
