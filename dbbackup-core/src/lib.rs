/*!
# dbbackup core

Backup and restore of relational databases (SQLite, PostgreSQL, MySQL) to
local disk or S3-compatible object storage, with optional gzip compression
and retention pruning.

The interesting part is the streaming pipeline: when the destination is
remote, the dump utility's stdout is uploaded as a live stream (optionally
through a concurrent gzip stage) without ever materializing the dump on
local disk. Everything else is deliberately simple: a backend detector, one
engine per database family wrapping its native dump/restore tools, two
storage backends behind one trait, and a name-driven retention policy.

## Usage

```no_run
use dbbackup_core::{engine_from_config, storage_from_config, BackupPipeline, Config};

let config = Config::from_env()?;
let engine = engine_from_config(&config)?;
let storage = storage_from_config(&config)?;

let pipeline = BackupPipeline::new(engine.as_ref(), storage.as_ref(), config.compress);
let artifact = pipeline.run_backup()?;
println!("stored {artifact}");
# Ok::<(), dbbackup_core::BackupError>(())
```
*/

pub mod compression;
pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod retention;
pub mod storage;

pub use compression::{GzipCompressor, COMPRESSED_SUFFIX};
pub use config::{Config, EngineSelection, S3Config, StorageSelection};
pub use detector::{detect, BackendKind, ConnectionInfo};
pub use engine::{engine_from_config, resolve_backend, BackupEngine, DumpStream};
pub use error::{BackupError, Result};
pub use pipeline::BackupPipeline;
pub use storage::{storage_from_config, LocalStorage, StorageBackend};
#[cfg(feature = "s3")]
pub use storage::S3Storage;
