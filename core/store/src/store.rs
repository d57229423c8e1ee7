//! Store facade over the per-database collections.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::collection::Collection;
use curio_common::{CollectionName, Error, Result};
use curio_crypto::CryptoEngine;

/// All collections of one database, opened lazily and cached.
///
/// Collections share the database engine, so every journal line they write
/// is encrypted under the same key.
#[derive(Debug)]
pub struct DocumentStore {
    root: PathBuf,
    engine: Arc<CryptoEngine>,
    collections: Mutex<HashMap<CollectionName, Arc<RwLock<Collection>>>>,
}

impl DocumentStore {
    /// Create a store rooted at a database directory.
    ///
    /// # Errors
    /// - `Configuration` if the root does not exist or is not a directory
    pub fn new(root: impl Into<PathBuf>, engine: Arc<CryptoEngine>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(Error::Configuration(format!(
                "database root {} is not a directory",
                root.display()
            )));
        }
        Ok(Self {
            root,
            engine,
            collections: Mutex::new(HashMap::new()),
        })
    }

    /// Database root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get a collection, opening it on first access.
    pub async fn collection(&self, name: CollectionName) -> Result<Arc<RwLock<Collection>>> {
        let mut collections = self.collections.lock().await;
        if let Some(existing) = collections.get(&name) {
            return Ok(Arc::clone(existing));
        }

        let path = self.root.join(name.file_name());
        let collection = Collection::open(path, Arc::clone(&self.engine)).await?;
        debug!(collection = %name, "Collection attached");

        let collection = Arc::new(RwLock::new(collection));
        collections.insert(name, Arc::clone(&collection));
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_root_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CryptoEngine::from_password("pw"));
        let result = DocumentStore::new(dir.path().join("absent"), engine);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[tokio::test]
    async fn test_collection_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CryptoEngine::from_password("pw"));
        let store = DocumentStore::new(dir.path(), engine).unwrap();

        let a = store.collection(CollectionName::Tags).await.unwrap();
        a.write()
            .await
            .insert(json!({"tag": "fantasy"}))
            .await
            .unwrap();

        let b = store.collection(CollectionName::Tags).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.read().await.count(&Filter::All), 1);
    }

    #[tokio::test]
    async fn test_collections_are_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(CryptoEngine::from_password("pw"));
        let store = DocumentStore::new(dir.path(), engine).unwrap();

        store
            .collection(CollectionName::Items)
            .await
            .unwrap()
            .write()
            .await
            .insert(json!({"name": "thing"}))
            .await
            .unwrap();

        assert!(dir.path().join("items.db").exists());
        assert!(!dir.path().join("tags.db").exists());
    }
}
