//! One encrypted document collection.
//!
//! A collection is an append-only journal file. Every line is an encrypted
//! envelope whose plaintext is one JSON record: a document revision, a
//! tombstone (`{"$deleted": id}`) or an index declaration (`{"$index":
//! field}`). Opening a collection replays the journal; later records
//! supersede earlier ones for the same id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::query::{Filter, FindOptions, Update};
use crate::query;
use curio_common::{DocumentId, Error, Result};
use curio_crypto::CryptoEngine;

const TOMBSTONE_KEY: &str = "$deleted";
const INDEX_KEY: &str = "$index";

/// In-memory equality index: canonical value -> ids holding it.
type IndexEntries = HashMap<String, Vec<String>>;

/// An open collection backed by an encrypted journal file.
#[derive(Debug)]
pub struct Collection {
    path: PathBuf,
    engine: Arc<CryptoEngine>,
    docs: HashMap<String, Value>,
    /// Ids in insertion order; replayed results keep journal order.
    order: Vec<String>,
    indexes: HashMap<String, IndexEntries>,
}

impl Collection {
    /// Open a collection, replaying its journal if the file exists.
    ///
    /// # Errors
    /// - `Decrypt` if a journal line cannot be decrypted or parsed
    pub async fn open(path: impl Into<PathBuf>, engine: Arc<CryptoEngine>) -> Result<Self> {
        let path = path.into();
        let mut collection = Self {
            path: path.clone(),
            engine,
            docs: HashMap::new(),
            order: Vec::new(),
            indexes: HashMap::new(),
        };

        if path.exists() {
            let contents = tokio::fs::read_to_string(&path).await?;
            for line in contents.lines() {
                if line.is_empty() {
                    continue;
                }
                let record = collection.decode_line(line)?;
                collection.replay(record);
            }
        }

        debug!(
            path = %path.display(),
            documents = collection.docs.len(),
            "Collection opened"
        );
        Ok(collection)
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Insert a new document, assigning a random id when none is present.
    ///
    /// # Errors
    /// - `Validation` if the document is not a JSON object or its id is
    ///   already taken
    pub async fn insert(&mut self, mut doc: Value) -> Result<Value> {
        let Some(map) = doc.as_object_mut() else {
            return Err(Error::Validation(
                "document must be a JSON object".to_string(),
            ));
        };

        let existing = map
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = DocumentId::random().as_str().to_string();
                map.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        if self.docs.contains_key(&id) {
            return Err(Error::Validation(format!("duplicate document id {id}")));
        }

        self.append_line(&doc).await?;
        self.index_doc(&id, &doc);
        self.docs.insert(id.clone(), doc.clone());
        self.order.push(id);
        Ok(doc)
    }

    /// Find documents matching a filter.
    pub fn find(&self, filter: &Filter, options: &FindOptions) -> Vec<Value> {
        let docs = match self.candidates(filter) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.docs.get(id))
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
            None => self
                .order
                .iter()
                .filter_map(|id| self.docs.get(id))
                .filter(|doc| filter.matches(doc))
                .cloned()
                .collect(),
        };
        options.apply(docs)
    }

    /// Find the first matching document.
    pub fn find_one(&self, filter: &Filter) -> Option<Value> {
        self.find(filter, &FindOptions::default()).into_iter().next()
    }

    /// Count documents matching a filter.
    pub fn count(&self, filter: &Filter) -> usize {
        match self.candidates(filter) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.docs.get(id))
                .filter(|doc| filter.matches(doc))
                .count(),
            None => self.docs.values().filter(|doc| filter.matches(doc)).count(),
        }
    }

    /// Apply an update to matching documents and return how many changed.
    ///
    /// With `multi` false only the first match (in insertion order) is
    /// updated.
    pub async fn update(&mut self, filter: &Filter, update: &Update, multi: bool) -> Result<usize> {
        let mut matched: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.docs
                    .get(id.as_str())
                    .map(|doc| filter.matches(doc))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !multi {
            matched.truncate(1);
        }

        for id in &matched {
            let Some(doc) = self.docs.get(id) else {
                continue;
            };
            let mut revised = doc.clone();
            update.apply(&mut revised);

            self.append_line(&revised).await?;
            self.unindex_doc(id);
            self.index_doc(id, &revised);
            self.docs.insert(id.clone(), revised);
        }
        Ok(matched.len())
    }

    /// Remove matching documents and return how many were removed.
    pub async fn remove(&mut self, filter: &Filter, multi: bool) -> Result<usize> {
        let mut matched: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.docs
                    .get(id.as_str())
                    .map(|doc| filter.matches(doc))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if !multi {
            matched.truncate(1);
        }

        for id in &matched {
            self.append_line(&json!({ TOMBSTONE_KEY: id })).await?;
            self.unindex_doc(id);
            self.docs.remove(id);
            self.order.retain(|existing| existing != id);
        }
        Ok(matched.len())
    }

    /// Declare an equality index on a field path.
    ///
    /// The declaration is journaled so reopening the collection rebuilds the
    /// index. Declaring the same field twice is a no-op.
    pub async fn ensure_index(&mut self, field: &str) -> Result<()> {
        if self.indexes.contains_key(field) {
            return Ok(());
        }
        self.append_line(&json!({ INDEX_KEY: field })).await?;
        self.build_index(field);
        Ok(())
    }

    /// Fields with an equality index.
    pub fn indexed_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.indexes.keys().cloned().collect();
        fields.sort();
        fields
    }

    fn decode_line(&self, line: &str) -> Result<Value> {
        // A line that is not an envelope is legacy plaintext; corruption is
        // an envelope that fails to decrypt, which stays an error.
        let text = if curio_crypto::TextEnvelope::is_envelope(line) {
            self.engine.decrypt_text(line)?
        } else {
            line.to_string()
        };
        serde_json::from_str(&text)
            .map_err(|e| Error::Decrypt(format!("malformed journal record: {e}")))
    }

    fn replay(&mut self, record: Value) {
        if let Some(id) = record.get(TOMBSTONE_KEY).and_then(Value::as_str) {
            let id = id.to_string();
            self.unindex_doc(&id);
            self.docs.remove(&id);
            self.order.retain(|existing| *existing != id);
            return;
        }
        if let Some(field) = record.get(INDEX_KEY).and_then(Value::as_str) {
            let field = field.to_string();
            if !self.indexes.contains_key(&field) {
                self.build_index(&field);
            }
            return;
        }
        if let Some(id) = record.get("id").and_then(Value::as_str) {
            let id = id.to_string();
            if self.docs.contains_key(&id) {
                self.unindex_doc(&id);
            } else {
                self.order.push(id.clone());
            }
            self.index_doc(&id, &record);
            self.docs.insert(id, record);
        }
    }

    async fn append_line(&self, record: &Value) -> Result<()> {
        let plaintext =
            serde_json::to_string(record).map_err(|e| Error::Serialization(e.to_string()))?;
        let mut line = self.engine.encrypt_text(&plaintext)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    fn build_index(&mut self, field: &str) {
        let mut entries: IndexEntries = HashMap::new();
        for id in &self.order {
            if let Some(doc) = self.docs.get(id) {
                for key in index_keys(doc, field) {
                    entries.entry(key).or_default().push(id.clone());
                }
            }
        }
        self.indexes.insert(field.to_string(), entries);
    }

    fn index_doc(&mut self, id: &str, doc: &Value) {
        for (field, entries) in &mut self.indexes {
            for key in index_keys(doc, field) {
                entries.entry(key).or_default().push(id.to_string());
            }
        }
    }

    fn unindex_doc(&mut self, id: &str) {
        for entries in self.indexes.values_mut() {
            for ids in entries.values_mut() {
                ids.retain(|existing| existing != id);
            }
        }
    }

    /// Narrow a filter to candidate ids via an equality index, if one
    /// applies. `None` means a full scan is required.
    fn candidates(&self, filter: &Filter) -> Option<Vec<String>> {
        match filter {
            Filter::Eq(field, value) => {
                let entries = self.indexes.get(field)?;
                let key = canonical_key(value)?;
                Some(entries.get(&key).cloned().unwrap_or_default())
            }
            Filter::And(filters) => filters.iter().find_map(|f| self.candidates(f)),
            _ => None,
        }
    }
}

/// Index keys contributed by one document for a field. An array field
/// contributes one key per element so membership queries hit the index.
fn index_keys(doc: &Value, field: &str) -> Vec<String> {
    match query::resolve(doc, field) {
        Some(Value::Array(elements)) => elements.iter().filter_map(canonical_key).collect(),
        Some(value) => canonical_key(value).into_iter().collect(),
        None => Vec::new(),
    }
}

fn canonical_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => serde_json::to_string(other).ok(),
    }
}
