//! File system storage backend.
//!
//! Writes go to a temporary file in the target directory and are renamed into
//! place on close, so readers never observe a partially written file.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{QuarryError, Result};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory holding all files.
    pub path: PathBuf,
    /// Whether to fsync files before publishing them.
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

fn default_sync_writes() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync_writes: default_sync_writes(),
        }
    }

    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }
}

/// Storage rooted at a local directory.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    sync_writes: bool,
}

impl FileStorage {
    /// Open (and create if needed) the storage directory.
    pub fn new(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Ok(Self {
            root: config.path,
            sync_writes: config.sync_writes,
        })
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative.components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if name.is_empty() || escapes {
            return Err(QuarryError::invalid_argument(format!(
                "invalid storage file name: '{name}'"
            )));
        }
        Ok(self.root.join(relative))
    }

    fn collect_files(&self, dir: &Path, names: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect_files(&path, names)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                // In-flight temporary files are not published yet.
                if !name.rsplit('/').next().unwrap_or("").starts_with(".tmp") {
                    names.push(name);
                }
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(|err| {
            QuarryError::storage(format!("failed to open '{}': {err}", path.display()))
        })?;
        let size = file.metadata()?.len();
        Ok(Box::new(FileInput {
            reader: BufReader::new(file),
            size,
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.resolve(name)?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent)?;
        let temp = NamedTempFile::new_in(&parent)?;
        Ok(Box::new(FileOutput {
            writer: Some(BufWriter::new(temp)),
            target: path,
            sync_writes: self.sync_writes,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.collect_files(&self.root, &mut names)?;
        names.sort();
        Ok(names)
    }
}

#[derive(Debug)]
struct FileInput {
    reader: BufReader<File>,
    size: u64,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.reader.read(buf)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> u64 {
        self.size
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: Option<BufWriter<NamedTempFile>>,
    target: PathBuf,
    sync_writes: bool,
}

impl FileOutput {
    fn writer(&mut self) -> std::io::Result<&mut BufWriter<NamedTempFile>> {
        self.writer
            .as_mut()
            .ok_or_else(|| std::io::Error::other("storage output already closed"))
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer()?.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        let sync = self.sync_writes;
        let writer = self.writer()?;
        writer.flush()?;
        if sync {
            writer.get_ref().as_file().sync_all()?;
        }
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.flush_and_sync()?;
        let writer = self
            .writer
            .take()
            .ok_or_else(|| QuarryError::internal("storage output already closed"))?;
        let temp = writer
            .into_inner()
            .map_err(|err| QuarryError::storage(format!("failed to flush output: {err}")))?;
        temp.persist(&self.target).map_err(|err| {
            QuarryError::storage(format!(
                "failed to publish '{}': {}",
                self.target.display(),
                err.error
            ))
        })?;
        Ok(())
    }
}
