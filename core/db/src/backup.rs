//! Collection file snapshots.
//!
//! A snapshot is a timestamped directory under `backup/` holding a
//! max-compression gzip copy of each collection file. Only the newest
//! snapshots are kept; the timestamp format makes lexicographic order equal
//! to chronological order, so pruning sorts by name.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::fs;
use tracing::{debug, info};

use crate::session::DatabaseSession;
use curio_common::{CollectionName, Result};

/// Snapshot directory name within a database root.
pub const BACKUP_DIR: &str = "backup";

/// Number of snapshots retained after pruning.
pub const MAX_SNAPSHOTS: usize = 20;

/// Snapshot the collection files and prune old snapshots.
///
/// Returns the path of the new snapshot directory. Collection files that do
/// not exist yet are simply absent from the snapshot.
pub async fn create_backup(session: &DatabaseSession) -> Result<PathBuf> {
    let root = session.root();
    let backups = root.join(BACKUP_DIR);
    fs::create_dir_all(&backups).await?;

    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let snapshot = backups.join(format!("backup{stamp}"));
    fs::create_dir(&snapshot).await?;

    for name in CollectionName::ALL {
        let source = root.join(name.file_name());
        if fs::metadata(&source).await.is_err() {
            continue;
        }
        let contents = fs::read(&source).await?;
        let target = snapshot.join(format!("{}.gz", name.file_name()));
        compress_to(&target, &contents)?;
        debug!(collection = %name, target = %target.display(), "Collection snapshotted");
    }

    let pruned = prune(&backups).await?;
    info!(
        snapshot = %snapshot.display(),
        pruned,
        "Backup created"
    );
    Ok(snapshot)
}

fn compress_to(path: &Path, contents: &[u8]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut encoder = GzEncoder::new(file, Compression::best());
    encoder.write_all(contents)?;
    encoder.finish()?;
    Ok(())
}

/// Remove all but the newest [`MAX_SNAPSHOTS`] snapshot directories and
/// return how many were removed.
async fn prune(backups: &Path) -> Result<usize> {
    let mut names: Vec<String> = Vec::new();
    let mut entries = fs::read_dir(backups).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("backup") && entry.path().is_dir() {
            names.push(name);
        }
    }

    names.sort_by(|a, b| b.cmp(a));
    let stale = names.split_off(names.len().min(MAX_SNAPSHOTS));
    for name in &stale {
        fs::remove_dir_all(backups.join(name)).await?;
    }
    Ok(stale.len())
}
