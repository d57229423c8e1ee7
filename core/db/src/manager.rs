//! Database creation and unlock.
//!
//! Both operations return an outcome enum for the expected user-facing
//! conditions (bad path, missing database) and reserve `Err` for failures
//! the caller cannot act on.

use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tracing::{info, warn};

use crate::session::{DatabaseSession, DATA_DIR};
use crate::settings::{DatabaseSettings, SettingsStore, SETTINGS_FILE};
use curio_common::{CollectionName, Result};
use curio_crypto::CryptoEngine;
use curio_store::DocumentStore;

/// Result of a database creation attempt.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(DatabaseSession),
    /// The parent path does not exist.
    PathNotExists,
    /// The parent path is not a directory.
    PathNotDirectory,
    /// The parent path cannot be written to.
    PathNotWritable,
    /// A directory with the requested name already exists.
    NameAlreadyExists,
}

/// Result of a database unlock attempt.
#[derive(Debug)]
pub enum UnlockOutcome {
    Unlocked(DatabaseSession),
    /// The path does not hold a database.
    DbNotExists,
}

/// Create a new database directory `<parent>/<name>` and open a session on
/// it.
///
/// A fresh database holds the encrypted settings blob, an empty attachment
/// directory, and an items collection with its standing indexes declared.
pub async fn create(
    parent: &Path,
    name: &str,
    password: &str,
    settings: DatabaseSettings,
) -> Result<CreateOutcome> {
    match fs::metadata(parent).await {
        Ok(meta) if !meta.is_dir() => return Ok(CreateOutcome::PathNotDirectory),
        Ok(_) => {}
        Err(_) => return Ok(CreateOutcome::PathNotExists),
    }
    if !is_writable(parent).await {
        return Ok(CreateOutcome::PathNotWritable);
    }

    let root = parent.join(name);
    if fs::metadata(&root).await.is_ok() {
        return Ok(CreateOutcome::NameAlreadyExists);
    }

    fs::create_dir(&root).await?;
    fs::create_dir(root.join(DATA_DIR)).await?;

    let engine = Arc::new(CryptoEngine::from_password(password));
    SettingsStore::new(&root).save(&engine, &settings).await?;

    let store = DocumentStore::new(&root, Arc::clone(&engine))?;
    let items = store.collection(CollectionName::Items).await?;
    {
        let mut items = items.write().await;
        items.ensure_index("tags").await?;
        items.ensure_index("category.id").await?;
    }

    info!(root = %root.display(), "Database created");
    Ok(CreateOutcome::Created(DatabaseSession::new(
        root, engine, store, settings,
    )))
}

/// Unlock an existing database and open a session on it.
///
/// Loading the settings blob is the password check: a wrong password
/// surfaces as a `Decrypt` error.
pub async fn unlock(root: &Path, password: &str) -> Result<UnlockOutcome> {
    if !root.is_dir() || !root.join(SETTINGS_FILE).is_file() {
        warn!(root = %root.display(), "Unlock attempted on a non-database path");
        return Ok(UnlockOutcome::DbNotExists);
    }

    let engine = Arc::new(CryptoEngine::from_password(password));
    let settings = SettingsStore::new(root).load(&engine).await?;
    let store = DocumentStore::new(root, Arc::clone(&engine))?;

    Ok(UnlockOutcome::Unlocked(DatabaseSession::new(
        root.to_path_buf(),
        engine,
        store,
        settings,
    )))
}

/// Probe writability by creating and removing a scratch file.
async fn is_writable(dir: &Path) -> bool {
    let probe = dir.join(".curio-write-probe");
    match fs::write(&probe, b"").await {
        Ok(()) => {
            let _ = fs::remove_file(&probe).await;
            true
        }
        Err(_) => false,
    }
}
