//! SQLite engine.
//!
//! File dumps prefer the `sqlite3` CLI's online `.backup`; when the CLI is
//! missing or fails, a library-level online backup through `rusqlite` takes
//! over, so SQLite backups work on hosts without the CLI installed. The
//! other engines have no such fallback (they need the server-side protocol
//! client).

use super::{artifact_filename, run_tool, spawn_tool, BackupEngine, DumpStream};
use crate::detector::{BackendKind, ConnectionInfo};
use crate::{BackupError, Result};
use rusqlite::{Connection, OpenFlags, MAIN_DB};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// First bytes of every SQLite database file.
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

pub struct SqliteEngine {
    db_path: PathBuf,
    output_dir: PathBuf,
}

impl SqliteEngine {
    pub fn new(conn: &ConnectionInfo, output_dir: PathBuf) -> Result<Self> {
        let db_path = conn
            .sqlite_path()
            .ok_or_else(|| BackupError::config("sqlite connection string is missing a database path"))?;
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            db_path: PathBuf::from(db_path),
            output_dir,
        })
    }

    fn cli_backup(&self, dest: &Path) -> Result<()> {
        let mut cmd = Command::new("sqlite3");
        cmd.arg(&self.db_path).arg(format!(".backup {}", dest.display()));
        run_tool(&mut cmd, "sqlite3", BackupError::dump)
    }

    /// Online backup through the bundled library, used when the CLI path
    /// is unavailable.
    fn library_backup(&self, dest: &Path) -> Result<()> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| BackupError::dump(format!("failed to open {}: {e}", self.db_path.display())))?;
        conn.backup(MAIN_DB, dest, None)
            .map_err(|e| BackupError::dump(format!("online backup to {} failed: {e}", dest.display())))
    }
}

impl BackupEngine for SqliteEngine {
    fn backup(&self) -> Result<PathBuf> {
        let dest = self.output_dir.join(artifact_filename(BackendKind::Sqlite));
        info!(dest = %dest.display(), "backing up sqlite database");

        if let Err(cli_err) = self.cli_backup(&dest) {
            debug!(error = %cli_err, "sqlite3 CLI backup unavailable, using library backup");
            self.library_backup(&dest)?;
        }
        Ok(dest)
    }

    fn backup_stream(&self) -> Result<Option<DumpStream>> {
        let name = artifact_filename(BackendKind::Sqlite);
        info!(artifact = %name, "running sqlite3 .dump (streaming)");

        let mut cmd = Command::new("sqlite3");
        cmd.arg(&self.db_path).arg(".dump").stdout(Stdio::piped());
        let child = spawn_tool(&mut cmd, "sqlite3", BackupError::dump)?;
        DumpStream::new(child, name).map(Some)
    }

    fn restore(&self, dump: &Path) -> Result<()> {
        if is_sqlite_snapshot(dump)? {
            // Binary snapshot: replace the live database file wholesale.
            info!(dump = %dump.display(), db = %self.db_path.display(), "restoring sqlite snapshot");
            fs::copy(dump, &self.db_path)?;
            return Ok(());
        }

        // SQL-text dump (the streaming format): replay it through the CLI.
        info!(dump = %dump.display(), db = %self.db_path.display(), "replaying sqlite SQL dump");
        let script = File::open(dump)?;
        let mut cmd = Command::new("sqlite3");
        cmd.arg(&self.db_path).stdin(Stdio::from(script));
        run_tool(&mut cmd, "sqlite3", BackupError::restore)
    }
}

/// Whether `path` starts with the SQLite database magic header.
fn is_sqlite_snapshot(path: &Path) -> std::io::Result<bool> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }
    Ok(header == *SQLITE_MAGIC)
}
