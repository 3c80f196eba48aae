//! Environment-sourced configuration.
//!
//! All knobs are read once at process start into an explicit [`Config`]
//! value that callers pass by reference into constructors; nothing reads
//! the environment after startup. The environment lookup itself is
//! injected, so tests exercise parsing without mutating process state.

use crate::detector::BackendKind;
use crate::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which storage backend receives artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageSelection {
    /// Local filesystem directory
    Local,
    /// S3-compatible object storage
    S3,
}

/// Engine selection: detect from the connection string, or force a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSelection {
    Auto,
    Forced(BackendKind),
}

/// S3 settings. Credentials fall back to the SDK default provider chain
/// when no explicit key pair is configured.
#[derive(Clone, Default)]
pub struct S3Config {
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub prefix: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    /// Canned ACL applied per uploaded object; `None` leaves the bucket default.
    pub default_acl: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("prefix", &self.prefix)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "***"))
            .field("endpoint_url", &self.endpoint_url)
            .field("default_acl", &self.default_acl)
            .finish()
    }
}

/// Complete runtime configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub engine: EngineSelection,
    /// Local storage root, and the work directory for dumps and restores.
    pub backup_dir: PathBuf,
    pub compress: bool,
    pub storage: StorageSelection,
    /// Age limit in days; zero or negative disables age-based pruning.
    pub retention_days: i64,
    /// Count limit; zero disables count-based pruning.
    pub max_backups: usize,
    pub s3: S3Config,
}

impl Config {
    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Recognized variables use canonical `DBBACKUP_*` names; the S3 block
    /// also accepts the legacy `AWS_*` names, with canonical taking
    /// precedence. Fails fast with [`BackupError::Config`] before any
    /// engine or storage is constructed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());

        let engine = match lookup("DBBACKUP_ENGINE").as_deref() {
            None | Some("") | Some("auto") => EngineSelection::Auto,
            Some(name) => EngineSelection::Forced(
                name.parse()
                    .map_err(|_| BackupError::config(format!("DBBACKUP_ENGINE: unknown engine '{name}'")))?,
            ),
        };

        if database_url.is_none() && engine == EngineSelection::Auto {
            return Err(BackupError::config("DATABASE_URL is required"));
        }

        let backup_dir = PathBuf::from(lookup("DBBACKUP_DIR").unwrap_or_else(|| "backups".to_string()));
        let compress = parse_bool(&lookup, "DBBACKUP_COMPRESS", true)?;

        let storage = match lookup("DBBACKUP_STORAGE").as_deref() {
            None | Some("") | Some("local") => StorageSelection::Local,
            Some("s3") => StorageSelection::S3,
            Some(other) => {
                return Err(BackupError::config(format!(
                    "DBBACKUP_STORAGE: unknown storage backend '{other}'"
                )))
            }
        };

        let retention_days = parse_int(&lookup, "DBBACKUP_RETENTION_DAYS")?;
        let max_backups = parse_int(&lookup, "DBBACKUP_MAX_BACKUPS")?.max(0) as usize;

        let s3 = S3Config {
            bucket: first_of(&lookup, &["DBBACKUP_S3_BUCKET", "AWS_S3_BUCKET"]),
            region: first_of(&lookup, &["DBBACKUP_S3_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]),
            prefix: lookup("DBBACKUP_S3_PREFIX").unwrap_or_default(),
            access_key_id: first_of(&lookup, &["DBBACKUP_S3_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]),
            secret_access_key: first_of(
                &lookup,
                &["DBBACKUP_S3_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"],
            ),
            endpoint_url: first_of(&lookup, &["DBBACKUP_S3_ENDPOINT_URL", "AWS_ENDPOINT_URL"]),
            default_acl: lookup("DBBACKUP_S3_DEFAULT_ACL")
                .map(|acl| acl.trim().to_string())
                .or_else(|| Some("private".to_string()))
                .filter(|acl| !acl.is_empty()),
        };

        let config = Config {
            database_url,
            engine,
            backup_dir,
            compress,
            storage,
            retention_days,
            max_backups,
            s3,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageSelection::S3 && self.s3.bucket.is_none() {
            return Err(BackupError::config(
                "DBBACKUP_S3_BUCKET is required for s3 storage",
            ));
        }
        Ok(())
    }
}

fn first_of<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(BackupError::config(format!("{key}: expected a boolean, got '{other}'"))),
        },
    }
}

fn parse_int<F>(lookup: &F, key: &str) -> Result<i64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(0),
        Some(raw) if raw.trim().is_empty() => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| BackupError::config(format!("{key}: expected an integer, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let env = lookup_from(&[("DATABASE_URL", "sqlite:///app.sqlite3")]);
        let config = Config::from_lookup(env).unwrap();

        assert_eq!(config.engine, EngineSelection::Auto);
        assert_eq!(config.backup_dir, PathBuf::from("backups"));
        assert!(config.compress);
        assert_eq!(config.storage, StorageSelection::Local);
        assert_eq!(config.retention_days, 0);
        assert_eq!(config.max_backups, 0);
        assert_eq!(config.s3.default_acl.as_deref(), Some("private"));
    }

    #[test]
    fn test_database_url_required_unless_engine_forced() {
        let err = Config::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));

        let config = Config::from_lookup(lookup_from(&[("DBBACKUP_ENGINE", "postgres")])).unwrap();
        assert_eq!(config.engine, EngineSelection::Forced(BackendKind::Postgres));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_ENGINE", "oracle"),
        ]);
        assert!(matches!(Config::from_lookup(env), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_s3_requires_bucket() {
        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_STORAGE", "s3"),
        ]);
        assert!(matches!(Config::from_lookup(env), Err(BackupError::Config(_))));

        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_STORAGE", "s3"),
            ("DBBACKUP_S3_BUCKET", "backups-bucket"),
        ]);
        let config = Config::from_lookup(env).unwrap();
        assert_eq!(config.storage, StorageSelection::S3);
        assert_eq!(config.s3.bucket.as_deref(), Some("backups-bucket"));
    }

    #[test]
    fn test_canonical_s3_names_take_precedence() {
        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_S3_REGION", "eu-central-1"),
            ("AWS_REGION", "us-east-1"),
            ("AWS_ACCESS_KEY_ID", "legacy-key"),
        ]);
        let config = Config::from_lookup(env).unwrap();
        assert_eq!(config.s3.region.as_deref(), Some("eu-central-1"));
        assert_eq!(config.s3.access_key_id.as_deref(), Some("legacy-key"));
    }

    #[test]
    fn test_bool_and_int_parsing() {
        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_COMPRESS", "no"),
            ("DBBACKUP_RETENTION_DAYS", "7"),
            ("DBBACKUP_MAX_BACKUPS", "-3"),
        ]);
        let config = Config::from_lookup(env).unwrap();
        assert!(!config.compress);
        assert_eq!(config.retention_days, 7);
        // Negative counts clamp to disabled.
        assert_eq!(config.max_backups, 0);

        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_RETENTION_DAYS", "often"),
        ]);
        assert!(matches!(Config::from_lookup(env), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_empty_acl_disables_acl() {
        let env = lookup_from(&[
            ("DATABASE_URL", "sqlite:///app.sqlite3"),
            ("DBBACKUP_S3_DEFAULT_ACL", ""),
        ]);
        let config = Config::from_lookup(env).unwrap();
        assert!(config.s3.default_acl.is_none());
    }
}
