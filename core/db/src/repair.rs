//! Collection file repair.
//!
//! An interrupted write can leave a collection file with truncated or
//! garbled lines. Repair streams every collection file line by line into a
//! staging copy, keeping only lines that are well-formed envelopes, decrypt
//! under the session key, and decrypt to valid JSON. Dropped lines are gone
//! for good; surviving lines keep their relative order.

use std::path::Path;

use tokio::fs;
use tracing::{info, warn};

use crate::session::DatabaseSession;
use curio_common::{CollectionName, Result};
use curio_crypto::TextEnvelope;

const REPAIR_DIR: &str = "tmp";

/// Line counts across all processed collection files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Lines examined.
    pub total: usize,
    /// Lines dropped as unreadable.
    pub removed: usize,
}

/// Repair every collection file of the session's database.
///
/// Missing and empty collection files are skipped. Each repaired file
/// replaces its source by rename only after every file has been processed,
/// so a failure mid-repair leaves all sources in place.
///
/// # Errors
/// - `OperationInProgress` if rotation or repair is already running
pub async fn repair(session: &DatabaseSession) -> Result<RepairReport> {
    let _guard = session.begin_maintenance("repair")?;

    let root = session.root();
    let staging = root.join(REPAIR_DIR);
    if fs::metadata(&staging).await.is_ok() {
        fs::remove_dir_all(&staging).await?;
    }
    fs::create_dir(&staging).await?;

    let mut report = RepairReport {
        total: 0,
        removed: 0,
    };
    let mut repaired: Vec<CollectionName> = Vec::new();

    for name in CollectionName::ALL {
        let source = root.join(name.file_name());
        let Ok(meta) = fs::metadata(&source).await else {
            continue;
        };
        if meta.len() == 0 {
            continue;
        }

        let (kept, counts) = filter_lines(session, &source).await?;
        fs::write(staging.join(name.file_name()), kept).await?;
        report.total += counts.total;
        report.removed += counts.removed;
        repaired.push(name);

        if counts.removed > 0 {
            warn!(
                collection = %name,
                removed = counts.removed,
                total = counts.total,
                "Dropped unreadable lines"
            );
        }
    }

    for name in repaired {
        fs::rename(staging.join(name.file_name()), root.join(name.file_name())).await?;
    }
    fs::remove_dir_all(&staging).await?;

    info!(
        root = %root.display(),
        total = report.total,
        removed = report.removed,
        "Repair finished"
    );
    Ok(report)
}

async fn filter_lines(session: &DatabaseSession, path: &Path) -> Result<(String, RepairReport)> {
    let contents = fs::read_to_string(path).await?;
    let mut kept = String::with_capacity(contents.len());
    let mut counts = RepairReport {
        total: 0,
        removed: 0,
    };

    for line in contents.lines() {
        if line.is_empty() {
            continue;
        }
        counts.total += 1;
        if line_is_readable(session, line) {
            kept.push_str(line);
            kept.push('\n');
        } else {
            counts.removed += 1;
        }
    }
    Ok((kept, counts))
}

fn line_is_readable(session: &DatabaseSession, line: &str) -> bool {
    if !TextEnvelope::is_envelope(line) {
        return false;
    }
    match session.engine().decrypt_text(line) {
        Ok(plaintext) => serde_json::from_str::<serde_json::Value>(&plaintext).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{self, CreateOutcome, UnlockOutcome};
    use crate::models::Tag;
    use crate::settings::DatabaseSettings;
    use curio_common::Error;

    async fn create_session(parent: &Path) -> DatabaseSession {
        match manager::create(parent, "vault", "pw", DatabaseSettings::default())
            .await
            .unwrap()
        {
            CreateOutcome::Created(session) => session,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    async fn add_tags(session: &DatabaseSession, labels: &[&str]) {
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        session.tags().await.unwrap().add(&labels).await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_store_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let session = create_session(dir.path()).await;
        add_tags(&session, &["a", "b", "c"]).await;

        let path = session.root().join(CollectionName::Tags.file_name());
        let before = std::fs::read_to_string(&path).unwrap();

        let report = repair(&session).await.unwrap();
        // items.db holds two index declarations from creation.
        assert_eq!(
            report,
            RepairReport {
                total: 5,
                removed: 0
            }
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(!session.root().join(REPAIR_DIR).exists());
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_dropped_order_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let session = create_session(dir.path()).await;
        add_tags(&session, &["first", "second", "third"]).await;

        let path = session.root().join(CollectionName::Tags.file_name());
        let good: Vec<String> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();

        // Interleave corruption: truncated envelope, plain garbage, and an
        // envelope encrypted under a different key.
        let foreign = curio_crypto::CryptoEngine::from_password("other")
            .encrypt_text(r#"{"tag":"foreign"}"#)
            .unwrap();
        let corrupted = format!(
            "{}\n{}\n{}\ngarbage not json\n{}\n{}\n",
            good[0],
            &good[1][..good[1].len() / 2],
            good[1],
            foreign,
            good[2],
        );
        std::fs::write(&path, corrupted).unwrap();

        let report = repair(&session).await.unwrap();
        assert_eq!(report.removed, 3);
        assert_eq!(report.total, 6 + 2); // tags lines + items index lines

        // Survivors keep their original relative order.
        let repaired = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = repaired.lines().collect();
        assert_eq!(lines, vec![good[0].as_str(), good[1].as_str(), good[2].as_str()]);

        // The collection loads cleanly afterwards.
        let reopened = match manager::unlock(session.root(), "pw").await.unwrap() {
            UnlockOutcome::Unlocked(session) => session,
            other => panic!("unexpected outcome: {other:?}"),
        };
        let tags: Vec<Tag> = reopened.tags().await.unwrap().find_all().await.unwrap();
        let labels: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(labels, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_missing_and_empty_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let session = create_session(dir.path()).await;

        // No tags/categories files yet; create an empty categories file.
        std::fs::write(
            session.root().join(CollectionName::Categories.file_name()),
            "",
        )
        .unwrap();

        let report = repair(&session).await.unwrap();
        // Only the items index declarations are counted.
        assert_eq!(
            report,
            RepairReport {
                total: 2,
                removed: 0
            }
        );
    }

    #[tokio::test]
    async fn test_repair_blocked_while_maintenance_runs() {
        let dir = tempfile::tempdir().unwrap();
        let session = create_session(dir.path()).await;

        let _guard = session.begin_maintenance("rotation").unwrap();
        assert!(matches!(
            repair(&session).await,
            Err(Error::OperationInProgress(_))
        ));
    }
}
