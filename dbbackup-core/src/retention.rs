//! Retention pruning.
//!
//! Two independent policies, each driven entirely by the artifact names:
//! age (the `YYYYMMDD` field embedded in every name) and count (names sort
//! lexicographically in creation order). Selection is pure; the pruning
//! wrappers re-list the store and issue the deletes. Names that do not
//! parse are skipped, never deleted.

use crate::storage::StorageBackend;
use crate::Result;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{info, warn};

/// Names whose embedded date is strictly older than `cutoff`.
pub fn select_expired<'a>(names: &'a [String], cutoff: NaiveDateTime) -> Vec<&'a str> {
    names
        .iter()
        .filter(|name| match parse_artifact_date(name) {
            Some(date) => date.and_time(NaiveTime::MIN) < cutoff,
            None => false,
        })
        .map(String::as_str)
        .collect()
}

/// The oldest `names.len() - max_backups` names, by name order; empty when
/// the store is within the limit.
pub fn select_excess(names: &[String], max_backups: usize) -> Vec<&str> {
    if names.len() <= max_backups {
        return Vec::new();
    }
    let mut sorted: Vec<&str> = names.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.truncate(names.len() - max_backups);
    sorted
}

/// Date field of `default-YYYYMMDD-HHMMSS.<ext>` names. Parsed
/// positionally after splitting on `-`; foreign names yield `None`.
fn parse_artifact_date(name: &str) -> Option<NaiveDate> {
    let field = name.split('-').nth(1)?;
    NaiveDate::parse_from_str(field, "%Y%m%d").ok()
}

/// Delete artifacts older than `retention_days` days. A limit of zero or
/// less disables the policy. Returns the number deleted; individual
/// deletion failures are logged and do not abort the batch.
pub fn prune_by_age(storage: &dyn StorageBackend, retention_days: i64) -> Result<usize> {
    if retention_days <= 0 {
        return Ok(0);
    }
    let cutoff = Local::now().naive_local() - Duration::days(retention_days);
    let names = storage.list()?;
    Ok(delete_all(storage, &select_expired(&names, cutoff), "age"))
}

/// Delete the oldest artifacts beyond `max_backups`. A limit of zero
/// disables the policy. Returns the number deleted.
pub fn prune_by_count(storage: &dyn StorageBackend, max_backups: usize) -> Result<usize> {
    if max_backups == 0 {
        return Ok(0);
    }
    let names = storage.list()?;
    Ok(delete_all(storage, &select_excess(&names, max_backups), "count"))
}

fn delete_all(storage: &dyn StorageBackend, names: &[&str], policy: &str) -> usize {
    let mut deleted = 0;
    for name in names {
        info!(artifact = name, policy, "deleting old backup");
        match storage.delete(name) {
            Ok(()) => deleted += 1,
            Err(e) => warn!(artifact = name, error = %e, "failed to delete backup, continuing"),
        }
    }
    deleted
}
