/*!
Dump/restore engines.

One engine per backend family, each wrapping the backend's native dump and
restore utilities as child processes. Connection parameters are passed as
explicit argument vectors (never through a shell), and passwords travel via
the child's environment so they can appear in neither argv nor logs.
*/

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::config::{Config, EngineSelection};
use crate::detector::{detect, BackendKind, ConnectionInfo};
use crate::{BackupError, Result};
use chrono::Local;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command};

pub use mysql::MysqlEngine;
pub use postgres::PostgresEngine;
pub use sqlite::SqliteEngine;

/// A live dump: the running dump process plus its piped stdout.
///
/// The stream carries the artifact name the dump would be stored under, so
/// consumers never re-derive naming. Dropping the stream closes the pipe;
/// the pipeline is responsible for reaping the child.
pub struct DumpStream {
    child: Child,
    stdout: ChildStdout,
    name: String,
}

impl DumpStream {
    /// Wrap a spawned child whose stdout was configured as piped.
    pub fn new(mut child: Child, name: String) -> Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackupError::dump("dump process has no captured stdout"))?;
        Ok(Self { child, stdout, name })
    }

    /// Name the artifact from this stream would be stored under (before
    /// any compression suffix).
    pub fn artifact_name(&self) -> &str {
        &self.name
    }

    pub fn into_parts(self) -> (Child, ChildStdout, String) {
        (self.child, self.stdout, self.name)
    }
}

/// A database dump/restore engine.
///
/// `backup_stream` is an optional capability: engines that cannot offer a
/// live dump return `Ok(None)` and callers fall back to `backup`.
pub trait BackupEngine {
    /// Dump the database to a file under the engine's output directory and
    /// return its path.
    fn backup(&self) -> Result<PathBuf>;

    /// Start a dump whose output is a live byte stream.
    fn backup_stream(&self) -> Result<Option<DumpStream>>;

    /// Restore the database from a dump file.
    fn restore(&self, dump: &Path) -> Result<()>;
}

/// Generated artifact file name: `default-YYYYMMDD-HHMMSS.<ext>`.
///
/// The fixed-width, zero-padded timestamp makes names lexicographically
/// sortable in creation order; retention depends on this exact layout.
pub(crate) fn artifact_filename(kind: BackendKind) -> String {
    format!(
        "default-{}.{}",
        Local::now().format("%Y%m%d-%H%M%S"),
        kind.file_extension()
    )
}

/// Resolve the backend kind for a configuration: forced, or detected from
/// the connection string.
pub fn resolve_backend(config: &Config) -> Result<BackendKind> {
    match config.engine {
        EngineSelection::Forced(kind) => Ok(kind),
        EngineSelection::Auto => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| BackupError::config("DATABASE_URL is required"))?;
            detect(url)
        }
    }
}

/// Construct the engine for a configuration.
pub fn engine_from_config(config: &Config) -> Result<Box<dyn BackupEngine>> {
    let kind = resolve_backend(config)?;
    let conn = match &config.database_url {
        Some(url) => ConnectionInfo::parse(url)?,
        None => ConnectionInfo {
            scheme: kind.as_str().to_string(),
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
        },
    };

    Ok(match kind {
        BackendKind::Sqlite => Box::new(SqliteEngine::new(&conn, config.backup_dir.clone())?),
        BackendKind::Postgres => Box::new(PostgresEngine::new(conn, config.backup_dir.clone())?),
        BackendKind::Mysql => Box::new(MysqlEngine::new(conn, config.backup_dir.clone())?),
    })
}

/// Spawn a dump/restore utility, mapping a missing executable to a clear
/// error instead of a bare ENOENT.
pub(crate) fn spawn_tool(
    cmd: &mut Command,
    tool: &str,
    err: fn(String) -> BackupError,
) -> Result<Child> {
    cmd.spawn().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => err(format!("{tool} not found on PATH")),
        _ => err(format!("failed to start {tool}: {e}")),
    })
}

/// Run a utility to completion, capturing stderr for the error message on
/// a non-zero exit.
pub(crate) fn run_tool(cmd: &mut Command, tool: &str, err: fn(String) -> BackupError) -> Result<()> {
    let output = cmd.output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => err(format!("{tool} not found on PATH")),
        _ => err(format!("failed to start {tool}: {e}")),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(err(format!(
            "{tool} exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}
