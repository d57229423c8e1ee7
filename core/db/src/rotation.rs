//! Password rotation.
//!
//! Rotation re-encrypts an entire database under a new password. All work
//! happens in a staging directory next to the live one; the live database
//! is swapped in only at the end, so any failure before the commit leaves
//! the original files byte-for-byte untouched. The replaced directory is
//! kept as a rollback copy until explicitly purged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::fs;
use tracing::{info, warn};

use crate::session::{DatabaseSession, DATA_DIR};
use crate::settings::SettingsStore;
use curio_common::{CollectionName, DocumentId, Error, Result};
use curio_crypto::CryptoEngine;
use curio_store::{DocumentStore, Filter, FindOptions};

const STAGING_SUFFIX: &str = "staging";
const ROLLBACK_SUFFIX: &str = "old";

/// Counts of re-encrypted records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationReport {
    pub tags: usize,
    pub categories: usize,
    pub items: usize,
}

/// Re-encrypt the whole database under `new_password` and activate it.
///
/// `progress` is called with a non-decreasing percentage after every copied
/// record; the final call reports 100. On success the session's key no
/// longer matches the files on disk, so the caller must drop the session
/// and unlock again with the new password.
///
/// The staging directory is `<root>.staging` (cleared on entry, consumed by
/// the commit). The previous database survives as `<root>.old` until
/// [`purge_rollback`] removes it.
///
/// # Errors
/// - `OperationInProgress` if rotation or repair is already running
/// - Any failure before the commit aborts with the live database untouched
pub async fn rotate_password(
    session: &DatabaseSession,
    new_password: &str,
    mut progress: impl FnMut(u8),
) -> Result<RotationReport> {
    let _guard = session.begin_maintenance("password rotation")?;

    let root = session.root();
    let new_engine = Arc::new(CryptoEngine::from_password(new_password));

    let staging = sibling_dir(root, STAGING_SUFFIX);
    if fs::metadata(&staging).await.is_ok() {
        warn!(path = %staging.display(), "Clearing stale staging directory");
        fs::remove_dir_all(&staging).await?;
    }
    fs::create_dir(&staging).await?;
    fs::create_dir(staging.join(DATA_DIR)).await?;

    let tag_docs = snapshot(session, CollectionName::Tags).await?;
    let category_docs = snapshot(session, CollectionName::Categories).await?;
    let item_docs = snapshot(session, CollectionName::Items).await?;

    // One extra step for the settings write at the end.
    let total = 1 + tag_docs.len() + category_docs.len() + item_docs.len();
    let mut step = 0usize;

    let new_store = DocumentStore::new(&staging, Arc::clone(&new_engine))?;
    let new_items = new_store.collection(CollectionName::Items).await?;
    {
        // Standing indexes must exist before any item lands.
        let mut new_items = new_items.write().await;
        new_items.ensure_index("tags").await?;
        new_items.ensure_index("category.id").await?;
    }

    let new_tags = new_store.collection(CollectionName::Tags).await?;
    for doc in &tag_docs {
        new_tags.write().await.insert(strip_id(doc)).await?;
        step += 1;
        progress(percent(step, total));
    }

    // Identifiers change on re-insertion; items need the old->new mapping.
    let mut category_ids: HashMap<String, String> = HashMap::new();
    let new_categories = new_store.collection(CollectionName::Categories).await?;
    for doc in &category_docs {
        let old_id = require_id(doc)?;
        let inserted = new_categories.write().await.insert(strip_id(doc)).await?;
        category_ids.insert(old_id, require_id(&inserted)?);
        step += 1;
        progress(percent(step, total));
    }

    for doc in &item_docs {
        let old_id = require_id(doc)?;
        let mut doc = strip_id(doc);
        remap_category(&mut doc, &category_ids);

        let inserted = new_items.write().await.insert(doc).await?;
        let new_id = require_id(&inserted)?;
        copy_attachments(
            session,
            &staging,
            &new_engine,
            &old_id,
            &new_id,
            &inserted,
        )
        .await?;
        step += 1;
        progress(percent(step, total));
    }

    SettingsStore::new(&staging)
        .save(&new_engine, &session.settings().await)
        .await?;
    step += 1;
    progress(percent(step, total));

    commit_swap(root, &staging).await?;

    let report = RotationReport {
        tags: tag_docs.len(),
        categories: category_docs.len(),
        items: item_docs.len(),
    };
    info!(
        root = %root.display(),
        tags = report.tags,
        categories = report.categories,
        items = report.items,
        "Password rotation committed"
    );
    Ok(report)
}

/// Rollback directory left behind by the last committed rotation.
pub fn rollback_dir(root: &Path) -> PathBuf {
    sibling_dir(root, ROLLBACK_SUFFIX)
}

/// Remove the rollback copy of a previous rotation, if one exists.
pub async fn purge_rollback(root: &Path) -> Result<bool> {
    let rollback = rollback_dir(root);
    if fs::metadata(&rollback).await.is_err() {
        return Ok(false);
    }
    fs::remove_dir_all(&rollback).await?;
    info!(path = %rollback.display(), "Rollback copy purged");
    Ok(true)
}

fn sibling_dir(root: &Path, suffix: &str) -> PathBuf {
    let mut name = root.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn percent(step: usize, total: usize) -> u8 {
    ((step * 100 + total - 1) / total) as u8
}

async fn snapshot(session: &DatabaseSession, name: CollectionName) -> Result<Vec<Value>> {
    let collection = session.store().collection(name).await?;
    let docs = collection
        .read()
        .await
        .find(&Filter::All, &FindOptions::default());
    Ok(docs)
}

fn strip_id(doc: &Value) -> Value {
    let mut doc = doc.clone();
    if let Some(map) = doc.as_object_mut() {
        map.remove("id");
    }
    doc
}

fn require_id(doc: &Value) -> Result<String> {
    doc.get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Validation("document has no id".to_string()))
}

/// Rewrite an item's category reference through the id map. A reference to
/// a category that no longer exists is cleared.
fn remap_category(doc: &mut Value, category_ids: &HashMap<String, String>) {
    let Some(old_id) = doc
        .get("category")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return;
    };
    match category_ids.get(&old_id) {
        Some(new_id) => {
            if let Some(id_slot) = doc
                .get_mut("category")
                .and_then(|c| c.get_mut("id"))
            {
                *id_slot = Value::String(new_id.clone());
            }
        }
        None => {
            warn!(category = %old_id, "Clearing stale category reference");
            if let Some(map) = doc.as_object_mut() {
                map.insert("category".to_string(), Value::Null);
            }
        }
    }
}

/// Re-encrypt every attachment of one item into the staging data directory,
/// keyed by the item's new identifier.
async fn copy_attachments(
    session: &DatabaseSession,
    staging: &Path,
    new_engine: &CryptoEngine,
    old_id: &str,
    new_id: &str,
    doc: &Value,
) -> Result<()> {
    let mut names: Vec<String> = Vec::new();
    if doc.get("avatar").and_then(Value::as_bool).unwrap_or(false) {
        names.push(crate::session::AVATAR_FILENAME.to_string());
    }
    if let Some(screenshots) = doc.get("screenshots").and_then(Value::as_array) {
        for screenshot in screenshots {
            if let Some(name) = screenshot.get("name").and_then(Value::as_str) {
                names.push(name.to_string());
            }
        }
    }
    if names.is_empty() {
        return Ok(());
    }

    let old_id = DocumentId::new(old_id)?;
    let target_dir = staging.join(DATA_DIR).join(new_id);
    fs::create_dir_all(&target_dir).await?;

    for name in names {
        let bytes = session.read_attachment(&old_id, &name).await?;
        new_engine.save_buffer(&bytes, &target_dir.join(&name)).await?;
    }
    Ok(())
}

/// Activate the staged database: the live root becomes the rollback copy
/// and staging takes its place. If the second rename fails the original is
/// moved back.
async fn commit_swap(root: &Path, staging: &Path) -> Result<()> {
    let rollback = rollback_dir(root);
    if fs::metadata(&rollback).await.is_ok() {
        fs::remove_dir_all(&rollback).await?;
    }

    fs::rename(root, &rollback).await?;
    if let Err(e) = fs::rename(staging, root).await {
        let _ = fs::rename(&rollback, root).await;
        return Err(e.into());
    }
    Ok(())
}
