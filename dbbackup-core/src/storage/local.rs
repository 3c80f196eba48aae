//! Local filesystem storage backend.

use super::StorageBackend;
use crate::{BackupError, Result};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Stores artifacts as regular files directly under a root directory.
///
/// The root is created on construction. Listing is non-recursive and
/// returns regular files only.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| {
            BackupError::storage(format!("failed to create {}: {e}", root.display()))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl StorageBackend for LocalStorage {
    fn upload_file(&self, local_path: &Path) -> Result<String> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                BackupError::storage(format!("invalid artifact path: {}", local_path.display()))
            })?
            .to_string();

        // Already resident under the root: nothing to copy.
        if local_path.parent() == Some(self.root.as_path()) {
            return Ok(name);
        }

        let dest = self.entry(&name);
        fs::copy(local_path, &dest).map_err(|e| {
            BackupError::storage(format!("failed to copy {} to {}: {e}", local_path.display(), dest.display()))
        })?;
        debug!(artifact = %name, root = %self.root.display(), "stored backup file");
        Ok(name)
    }

    fn upload_stream(&self, reader: &mut dyn Read, name: &str) -> Result<String> {
        let dest = self.entry(name);
        let mut file = File::create(&dest)
            .map_err(|e| BackupError::storage(format!("failed to create {}: {e}", dest.display())))?;
        io::copy(reader, &mut file)
            .map_err(|e| BackupError::storage(format!("failed to write {}: {e}", dest.display())))?;
        debug!(artifact = %name, root = %self.root.display(), "stored backup stream");
        Ok(name.to_string())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<()> {
        let src = self.entry(name);
        if src == dest {
            return Ok(());
        }
        fs::copy(&src, dest)
            .map_err(|e| BackupError::storage(format!("failed to read {}: {e}", src.display())))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| BackupError::storage(format!("failed to list {}: {e}", self.root.display())))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| BackupError::storage(format!("failed to list {}: {e}", self.root.display())))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<()> {
        let path = self.entry(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BackupError::storage(format!("failed to delete {}: {e}", path.display()))),
        }
    }

    fn is_local(&self) -> bool {
        true
    }
}
