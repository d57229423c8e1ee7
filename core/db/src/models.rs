//! Catalog document models.
//!
//! These serialize to the exact JSON shapes stored in the collection
//! journals, so the field names here are the on-disk field names
//! (camelCase).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use curio_common::{DocumentId, Error, Result};

/// A cataloged item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub name: String,
    /// Creator code used for lookup by external link.
    #[serde(default)]
    pub patreon: Option<String>,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub in_development: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Denormalized category snapshot; `None` means uncategorized.
    #[serde(default)]
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub screenshots: Vec<Screenshot>,
    /// Whether an encrypted avatar file exists for this item.
    #[serde(default)]
    pub avatar: bool,
}

/// Category snapshot embedded in an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: DocumentId,
    pub name: String,
    pub color: String,
    pub dark: bool,
}

/// One screenshot attachment, named after its encrypted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screenshot {
    pub name: String,
}

/// A tag document. Tags are plain labels; items reference them by value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub tag: String,
}

/// A category document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub name: String,
    pub color: String,
    pub dark: bool,
}

impl Category {
    /// Snapshot of this category for embedding in items.
    ///
    /// # Errors
    /// - `Validation` if the category has not been inserted yet
    pub fn to_ref(&self) -> Result<CategoryRef> {
        let id = self
            .id
            .clone()
            .ok_or_else(|| Error::Validation("category has no id".to_string()))?;
        Ok(CategoryRef {
            id,
            name: self.name.clone(),
            color: self.color.clone(),
            dark: self.dark,
        })
    }
}

pub(crate) fn to_document<T: Serialize>(model: &T) -> Result<Value> {
    serde_json::to_value(model).map_err(|e| Error::Serialization(e.to_string()))
}

pub(crate) fn from_document<T: for<'de> Deserialize<'de>>(doc: Value) -> Result<T> {
    serde_json::from_value(doc).map_err(|e| Error::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_serializes_camel_case() {
        let item = Item {
            id: Some(DocumentId::new("a1").unwrap()),
            name: "Example".to_string(),
            patreon: None,
            rating: 4,
            favorite: false,
            archived: false,
            completed: true,
            in_development: true,
            tags: vec!["rpg".to_string()],
            category: None,
            screenshots: vec![Screenshot {
                name: "0_screen.jpg.enc".to_string(),
            }],
            avatar: true,
        };
        let doc = to_document(&item).unwrap();
        assert_eq!(doc["inDevelopment"], json!(true));
        assert_eq!(doc["screenshots"][0]["name"], "0_screen.jpg.enc");
        assert!(doc.get("in_development").is_none());
    }

    #[test]
    fn test_item_deserializes_with_defaults() {
        let item: Item = from_document(json!({"id": "a1", "name": "Bare"})).unwrap();
        assert_eq!(item.rating, 0);
        assert!(item.tags.is_empty());
        assert!(item.category.is_none());
        assert!(!item.avatar);
    }

    #[test]
    fn test_category_ref_requires_id() {
        let category = Category {
            id: None,
            name: "Games".to_string(),
            color: "#aabbcc".to_string(),
            dark: false,
        };
        assert!(matches!(category.to_ref(), Err(Error::Validation(_))));
    }
}
