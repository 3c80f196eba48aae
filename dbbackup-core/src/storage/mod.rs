/*!
Storage backends for backup artifacts.

This module defines the storage abstraction and its concrete
implementations. Artifacts are identified by name only; backends hold no
state beyond their root location and never cache listings.
*/

pub mod local;
#[cfg(feature = "s3")]
pub mod s3;

use crate::config::{Config, StorageSelection};
use crate::Result;
use std::io::Read;
use std::path::Path;

pub use local::LocalStorage;
#[cfg(feature = "s3")]
pub use s3::S3Storage;

/// A place backup artifacts live.
///
/// Implementations accept either a completed file or a live byte stream.
/// I/O and permission failures surface as [`crate::BackupError::Storage`]
/// with the offending path or key attached; there is no retry at this
/// layer.
pub trait StorageBackend {
    /// Persist a completed file under its own file name; returns the
    /// artifact name.
    fn upload_file(&self, local_path: &Path) -> Result<String>;

    /// Persist a live byte stream under `name`; returns the artifact name.
    fn upload_stream(&self, reader: &mut dyn Read, name: &str) -> Result<String>;

    /// Fetch a named artifact into `dest`.
    fn download(&self, name: &str, dest: &Path) -> Result<()>;

    /// All artifact names in the store, in no particular order.
    fn list(&self) -> Result<Vec<String>>;

    /// Remove a named artifact, succeeding silently if it is absent.
    fn delete(&self, name: &str) -> Result<()>;

    /// Whether artifacts land on the local filesystem; drives the
    /// pipeline's streaming-vs-direct selection.
    fn is_local(&self) -> bool {
        false
    }
}

/// Construct the storage backend for a configuration.
pub fn storage_from_config(config: &Config) -> Result<Box<dyn StorageBackend>> {
    match config.storage {
        StorageSelection::Local => Ok(Box::new(LocalStorage::new(&config.backup_dir)?)),
        StorageSelection::S3 => {
            #[cfg(feature = "s3")]
            {
                Ok(Box::new(S3Storage::new(&config.s3)?))
            }
            #[cfg(not(feature = "s3"))]
            {
                Err(crate::BackupError::config(
                    "s3 storage selected, but dbbackup-core was built without the 's3' feature",
                ))
            }
        }
    }
}

/// In-memory storage for tests: a remote-like backend (`is_local` is
/// false) without touching disk or network.
#[cfg(test)]
pub struct MemoryStorage {
    objects: std::sync::Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: std::sync::Mutex::new(std::collections::BTreeMap::new()),
        }
    }

    pub fn insert(&self, name: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(name.to_string(), data);
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[cfg(test)]
impl StorageBackend for MemoryStorage {
    fn upload_file(&self, local_path: &Path) -> Result<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("test artifact path has a file name")
            .to_string();
        let data = std::fs::read(local_path)?;
        self.insert(&name, data);
        Ok(name)
    }

    fn upload_stream(&self, reader: &mut dyn Read, name: &str) -> Result<String> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.insert(name, data);
        Ok(name.to_string())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let data = self
            .get(name)
            .ok_or_else(|| crate::BackupError::storage(format!("no such artifact: {name}")))?;
        std::fs::write(dest, data)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.objects.lock().unwrap().keys().cloned().collect())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.objects.lock().unwrap().remove(name);
        Ok(())
    }
}
