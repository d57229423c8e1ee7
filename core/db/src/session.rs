//! Unlocked database session.
//!
//! A session owns everything scoped to one unlocked database: the derived
//! key (via the engine), the collection store, the loaded settings and the
//! attachment directory layout. Every store and crypto call goes through a
//! session, so two databases can be open at once without shared state.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::info;

use crate::repository::{CategoryRepository, ItemRepository, TagRepository};
use crate::settings::{DatabaseSettings, SettingsStore};
use curio_common::{DocumentId, Error, Result};
use curio_crypto::CryptoEngine;
use curio_store::DocumentStore;

/// Attachment directory name within a database root.
pub const DATA_DIR: &str = "data";

/// Encrypted avatar file name within an item's attachment directory.
pub const AVATAR_FILENAME: &str = "avatar.jpg.enc";

/// Encrypted screenshot file name for a screenshot slot.
pub fn screenshot_file_name(index: usize) -> String {
    format!("{index}_screen.jpg.enc")
}

/// One unlocked database.
#[derive(Debug)]
pub struct DatabaseSession {
    root: PathBuf,
    engine: Arc<CryptoEngine>,
    store: DocumentStore,
    settings: RwLock<DatabaseSettings>,
    maintenance: Arc<AtomicBool>,
}

impl DatabaseSession {
    pub(crate) fn new(
        root: PathBuf,
        engine: Arc<CryptoEngine>,
        store: DocumentStore,
        settings: DatabaseSettings,
    ) -> Self {
        info!(root = %root.display(), "Database session opened");
        Self {
            root,
            engine,
            store,
            settings: RwLock::new(settings),
            maintenance: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Database root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Encryption engine holding this session's key.
    pub fn engine(&self) -> &Arc<CryptoEngine> {
        &self.engine
    }

    /// Collection store for this database.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Current settings snapshot.
    pub async fn settings(&self) -> DatabaseSettings {
        self.settings.read().await.clone()
    }

    /// Persist new settings and make them current.
    pub async fn update_settings(&self, settings: DatabaseSettings) -> Result<()> {
        SettingsStore::new(&self.root)
            .save(&self.engine, &settings)
            .await?;
        *self.settings.write().await = settings;
        Ok(())
    }

    /// Item repository.
    pub async fn items(&self) -> Result<ItemRepository> {
        ItemRepository::attach(&self.store).await
    }

    /// Tag repository.
    pub async fn tags(&self) -> Result<TagRepository> {
        TagRepository::attach(&self.store).await
    }

    /// Category repository.
    pub async fn categories(&self) -> Result<CategoryRepository> {
        CategoryRepository::attach(&self.store).await
    }

    /// Attachment directory of the database.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    /// Attachment directory of one item.
    pub fn item_data_dir(&self, id: &DocumentId) -> PathBuf {
        self.data_dir().join(id.as_str())
    }

    /// Encrypt and store an attachment for an item, creating the item's
    /// directory on first use.
    pub async fn save_attachment(
        &self,
        id: &DocumentId,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.item_data_dir(id);
        fs::create_dir_all(&dir).await?;
        let path = dir.join(file_name);
        self.engine.save_buffer(bytes, &path).await?;
        Ok(path)
    }

    /// Read and decrypt an attachment of an item.
    pub async fn read_attachment(&self, id: &DocumentId, file_name: &str) -> Result<Vec<u8>> {
        self.engine
            .read_buffer(&self.item_data_dir(id).join(file_name))
            .await
    }

    /// Claim the exclusive maintenance slot for this session.
    ///
    /// Rotation and repair rewrite files underneath the store, so only one
    /// of them may run at a time. The slot is released when the returned
    /// guard drops.
    ///
    /// # Errors
    /// - `OperationInProgress` if another maintenance operation holds the slot
    pub fn begin_maintenance(&self, operation: &str) -> Result<MaintenanceGuard> {
        if self
            .maintenance
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::OperationInProgress(format!(
                "cannot start {operation}: another maintenance operation is running"
            )));
        }
        Ok(MaintenanceGuard {
            flag: Arc::clone(&self.maintenance),
        })
    }
}

/// Holds the maintenance slot of a session until dropped.
#[derive(Debug)]
pub struct MaintenanceGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
