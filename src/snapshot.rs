//! JSON snapshots of crawl results.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{error, info};

/// What a snapshot file holds; decides its file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Forums,
    UsersGeneral,
    UsersDetailed,
}

impl SnapshotKind {
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Forums => "forums",
            Self::UsersGeneral => "user_information",
            Self::UsersDetailed => "user_detailed_information",
        }
    }
}

/// `<dir>/<prefix>_<YYYY-mm-dd_HH-MM>.json`
#[must_use]
pub fn snapshot_path(dir: &Path, kind: SnapshotKind, at: NaiveDateTime) -> PathBuf {
    dir.join(format!("{}_{}.json", kind.prefix(), at.format("%Y-%m-%d_%H-%M")))
}

/// Write `records` as pretty JSON, returning the file written.
pub async fn write_snapshot<T: Serialize + ?Sized>(
    dir: &Path,
    kind: SnapshotKind,
    at: NaiveDateTime,
    records: &T,
) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create snapshot directory {}", dir.display()))?;

    let path = snapshot_path(dir, kind, at);
    let json = serde_json::to_string_pretty(records).context("Failed to serialize snapshot")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

    info!(path = %path.display(), "Snapshot written");
    Ok(path)
}

/// Like [`write_snapshot`], but only logs a failure.
pub async fn save_snapshot<T: Serialize + ?Sized>(
    dir: &Path,
    kind: SnapshotKind,
    at: NaiveDateTime,
    records: &T,
) -> Option<PathBuf> {
    match write_snapshot(dir, kind, at, records).await {
        Ok(path) => Some(path),
        Err(e) => {
            error!(error = %format!("{e:#}"), kind = kind.prefix(), "Failed to save snapshot");
            None
        }
    }
}
