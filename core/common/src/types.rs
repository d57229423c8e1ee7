//! Common types used throughout Curio.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a stored document.
///
/// Assigned by the store on insert and fixed for the document's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Create an identifier from an existing string.
    ///
    /// # Errors
    /// - Returns error if `id` is empty
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::Validation(
                "DocumentId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of collections backing one database.
///
/// Each collection is one line-oriented file in the database root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionName {
    Items,
    Tags,
    Categories,
}

impl CollectionName {
    /// All collections, in the order maintenance operations process them.
    pub const ALL: [CollectionName; 3] = [
        CollectionName::Items,
        CollectionName::Tags,
        CollectionName::Categories,
    ];

    /// File name of the backing collection file.
    pub fn file_name(&self) -> &'static str {
        match self {
            CollectionName::Items => "items.db",
            CollectionName::Tags => "tags.db",
            CollectionName::Categories => "categories.db",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionName::Items => write!(f, "items"),
            CollectionName::Tags => write!(f, "tags"),
            CollectionName::Categories => write!(f, "categories"),
        }
    }
}
