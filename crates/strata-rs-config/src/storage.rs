//! Storage backends that documents are read from and snapshots written to.

use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Storage abstraction used by the loader and the override merger.
///
/// Paths are passed through exactly as resolved, including URI references,
/// so a backend decides for itself what a reference means.
pub trait ConfigStorage: Send + Sync {
    /// Whether a readable document exists at the path.
    fn exists(&self, path: &str) -> bool;

    /// Read the raw bytes of a document.
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Write a serialized document, replacing any previous contents.
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;
}

/// Local filesystem storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStorage;

impl ConfigStorage for FileStorage {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        match Path::new(path).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)?,
            _ => {}
        }
        debug!("writing document (path={}, bytes={})", path, contents.len());
        fs::write(path, contents)
    }
}

/// In-memory storage keyed by reference string.
///
/// Useful for embedding and tests; every write is recorded in order.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    writes: Mutex<Vec<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document and return the storage.
    pub fn with_file(self, path: impl Into<String>, contents: impl AsRef<[u8]>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Seed or replace a document without recording a write.
    pub fn insert(&self, path: impl Into<String>, contents: impl AsRef<[u8]>) {
        self.files
            .lock()
            .insert(path.into(), contents.as_ref().to_vec());
    }

    /// Current contents of a document, if present.
    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().get(path).cloned()
    }

    /// Paths written through [`ConfigStorage::write`], in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }
}

impl ConfigStorage for MemoryStorage {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files.lock().get(path).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no document at {path}"))
        })
    }

    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.files.lock().insert(path.to_string(), contents.to_vec());
        self.writes.lock().push(path.to_string());
        Ok(())
    }
}
