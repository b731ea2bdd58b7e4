//! Pluggable blob storage used for persisted index state and metadata snapshots.
//!
//! A [`Storage`] is a flat namespace of named files. Names may contain `/`
//! separators; backends map them onto their own layout.

pub mod file;
pub mod memory;

use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;

use self::file::{FileStorage, FileStorageConfig};
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// Readable handle to a stored file.
pub trait StorageInput: Read + Send + Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> u64;
}

/// Writable handle to a stored file.
///
/// Data written through an output only becomes visible to readers once the
/// output is closed.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and sync them to the backing medium.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Publish the written file and release the handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A storage backend.
pub trait Storage: Send + Sync + Debug {
    /// Open a file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names currently stored.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Read a whole file into memory.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut bytes = Vec::with_capacity(input.size() as usize);
        input.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Write a whole file, replacing any previous content.
    fn write_all(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let mut output = self.create_output(name)?;
        output.write_all(bytes)?;
        output.flush_and_sync()?;
        output.close()
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Keep everything in process memory.
    Memory(MemoryStorageConfig),
    /// Store files under a directory on the local file system.
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Factory for creating storage backends from configuration.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match config {
            StorageConfig::Memory(config) => Arc::new(MemoryStorage::new(config)),
            StorageConfig::File(config) => Arc::new(FileStorage::new(config)?),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_memory_storage() {
        let storage = StorageFactory::create(StorageConfig::default()).unwrap();
        storage.write_all("a/b.bin", b"hello").unwrap();
        assert!(storage.file_exists("a/b.bin"));
        assert_eq!(storage.read_all("a/b.bin").unwrap(), b"hello");
    }

    #[test]
    fn test_factory_creates_file_storage() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig::File(FileStorageConfig::new(dir.path()));
        let storage = StorageFactory::create(config).unwrap();
        storage.write_all("x.bin", b"data").unwrap();
        assert_eq!(storage.read_all("x.bin").unwrap(), b"data");
    }

    #[test]
    fn test_config_serde_tag() {
        let json = serde_json::to_string(&StorageConfig::default()).unwrap();
        assert!(json.contains("\"type\":\"memory\""));
    }
}
