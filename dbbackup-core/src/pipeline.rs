/*!
Backup/restore orchestration.

The backup side picks one of three paths per invocation:

- **Direct**: the destination is local storage; dump to a file, optionally
  compress it, move it into the store.
- **StreamPlain**: remote destination, compression off; the dump
  process's stdout is handed straight to the storage upload.
- **StreamCompressed**: remote destination, compression on; a single
  worker thread pipes the dump output through the gzip encoder into one
  end of an OS pipe while the main flow uploads from the other end. The
  pipe's buffer is the only flow control; a slow upload blocks the worker,
  which in turn blocks the dump process.

In the streaming paths the dump never materializes on local disk. A
compression-worker failure or a non-zero dump exit deletes the uploaded
artifact (best-effort) and fails the invocation, so a truncated artifact is
never left visible.
*/

use crate::compression::{GzipCompressor, COMPRESSED_SUFFIX};
use crate::engine::{BackupEngine, DumpStream};
use crate::storage::StorageBackend;
use crate::{BackupError, Result};
use std::fs;
use std::io;
use std::thread;
use tracing::{debug, info, warn};

pub struct BackupPipeline<'a> {
    engine: &'a dyn BackupEngine,
    storage: &'a dyn StorageBackend,
    compressor: GzipCompressor,
    compress: bool,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(engine: &'a dyn BackupEngine, storage: &'a dyn StorageBackend, compress: bool) -> Self {
        Self {
            engine,
            storage,
            compressor: GzipCompressor::new(),
            compress,
        }
    }

    /// Run one backup; returns the stored artifact name.
    pub fn run_backup(&self) -> Result<String> {
        if !self.storage.is_local() {
            if let Some(stream) = self.engine.backup_stream()? {
                return if self.compress {
                    self.stream_compressed(stream)
                } else {
                    self.stream_plain(stream)
                };
            }
            debug!("engine offers no stream dump, falling back to file-based upload");
        }
        self.file_based()
    }

    /// Restore from the named artifact, or the latest one when `name` is
    /// `None`. Returns the restored artifact name, or `Ok(None)` when the
    /// store is empty.
    pub fn run_restore(&self, name: Option<&str>) -> Result<Option<String>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let mut names = self.storage.list()?;
                names.sort_unstable();
                match names.pop() {
                    Some(latest) => {
                        info!(artifact = %latest, "no backup specified, using latest");
                        latest
                    }
                    None => return Ok(None),
                }
            }
        };

        // Scratch directory for the download; dropped (and removed) on
        // success and failure alike, so stored artifacts are never
        // decompressed in place.
        let scratch = tempfile::tempdir()?;
        let downloaded = scratch.path().join(&name);
        self.storage.download(&name, &downloaded)?;

        let dump = self.compressor.decompress_file(&downloaded)?;
        self.engine.restore(&dump)?;
        Ok(Some(name))
    }

    fn file_based(&self) -> Result<String> {
        let mut dump = self.engine.backup()?;
        if self.compress {
            dump = self.compressor.compress_file(&dump)?;
        }
        let name = self.storage.upload_file(&dump)?;

        if !self.storage.is_local() {
            // The local dump was only a staging copy.
            if let Err(e) = fs::remove_file(&dump) {
                warn!(path = %dump.display(), error = %e, "failed to remove local temporary dump");
            }
        }
        Ok(name)
    }

    fn stream_plain(&self, stream: DumpStream) -> Result<String> {
        let (mut child, mut stdout, name) = stream.into_parts();
        info!(artifact = %name, "streaming dump to storage");

        let upload = self.storage.upload_stream(&mut stdout, &name);
        drop(stdout);
        let status = child.wait();

        let name = upload?;
        self.check_dump_exit(status, &name)?;
        Ok(name)
    }

    fn stream_compressed(&self, stream: DumpStream) -> Result<String> {
        let (mut child, stdout, name) = stream.into_parts();
        let artifact = format!("{name}.{COMPRESSED_SUFFIX}");
        info!(artifact = %artifact, "streaming compressed dump to storage");

        let (mut reader, writer) = io::pipe()?;
        let compressor = self.compressor.clone();
        // The worker takes ownership of the dump stdout, so the handle is
        // closed on every exit path and the dump process cannot stay
        // blocked on a full pipe after a compression failure.
        let worker = thread::spawn(move || compressor.compress_stream(stdout, writer));

        let upload = self.storage.upload_stream(&mut reader, &artifact);
        // Unblocks the worker (broken pipe) if the upload bailed early.
        drop(reader);

        let worker_result = worker
            .join()
            .unwrap_or_else(|_| Err(BackupError::compression("compression worker panicked")));
        let status = child.wait();

        let artifact = upload?;
        if let Err(e) = worker_result {
            self.discard(&artifact);
            return Err(e);
        }
        self.check_dump_exit(status, &artifact)?;
        Ok(artifact)
    }

    /// Fail (and discard the uploaded artifact) unless the dump process
    /// exited cleanly.
    fn check_dump_exit(&self, status: io::Result<std::process::ExitStatus>, artifact: &str) -> Result<()> {
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                self.discard(artifact);
                Err(BackupError::dump(format!("dump process exited with {status}")))
            }
            Err(e) => {
                self.discard(artifact);
                Err(BackupError::dump(format!("failed to reap dump process: {e}")))
            }
        }
    }

    fn discard(&self, artifact: &str) {
        if let Err(e) = self.storage.delete(artifact) {
            warn!(artifact, error = %e, "failed to delete incomplete artifact");
        }
    }
}
