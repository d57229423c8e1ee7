//! Typed repositories over the encrypted collections.
//!
//! Repositories translate catalog operations into store filters and updates
//! and convert between models and their journal documents. They hold a
//! handle to the shared collection, so clones and repeated attachments see
//! the same data.

use std::sync::Arc;

use regex::RegexBuilder;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::models::{self, Category, CategoryRef, Item, Tag};
use curio_common::{CollectionName, DocumentId, Error, Result};
use curio_store::{Collection, DocumentStore, Filter, FindOptions, SortOrder, Update};

/// Filter set for item listing and counting.
///
/// `archived` always applies; the rest narrow the list when set. `tags`
/// requires every named tag to be present.
#[derive(Debug, Clone)]
pub struct ItemFilters {
    pub archived: bool,
    pub category: Option<CategoryFilter>,
    pub favorites: Option<bool>,
    /// Substring match on the name, case-insensitive.
    pub name: Option<String>,
    pub in_development: Option<bool>,
    pub completed: Option<bool>,
    pub min_rating: Option<u8>,
    pub tags: Vec<String>,
}

impl Default for ItemFilters {
    fn default() -> Self {
        Self {
            archived: false,
            category: None,
            favorites: None,
            name: None,
            in_development: None,
            completed: None,
            min_rating: None,
            tags: Vec::new(),
        }
    }
}

/// Category narrowing for item queries.
#[derive(Debug, Clone)]
pub enum CategoryFilter {
    /// Items with no category assigned.
    Uncategorized,
    /// Items assigned to one category.
    Id(DocumentId),
}

impl ItemFilters {
    fn to_filter(&self) -> Result<Filter> {
        let mut filters = vec![Filter::eq("archived", self.archived)];

        match &self.category {
            Some(CategoryFilter::Uncategorized) => {
                filters.push(Filter::eq("category", Value::Null));
            }
            Some(CategoryFilter::Id(id)) => {
                filters.push(Filter::eq("category.id", id.as_str()));
            }
            None => {}
        }
        if let Some(favorites) = self.favorites {
            filters.push(Filter::eq("favorite", favorites));
        }
        if let Some(name) = &self.name {
            let regex = RegexBuilder::new(&regex::escape(name))
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Validation(format!("invalid name filter: {e}")))?;
            filters.push(Filter::Regex("name".to_string(), regex));
        }
        if let Some(in_development) = self.in_development {
            filters.push(Filter::eq("inDevelopment", in_development));
        }
        if let Some(completed) = self.completed {
            filters.push(Filter::eq("completed", completed));
        }
        if let Some(rating) = self.min_rating {
            filters.push(Filter::gte("rating", rating));
        }
        for tag in &self.tags {
            filters.push(Filter::eq("tags", tag.as_str()));
        }

        Ok(Filter::And(filters))
    }
}

/// Sort applied to an item listing.
#[derive(Debug, Clone)]
pub struct ItemSort {
    pub field: String,
    pub order: SortOrder,
}

/// Repository for the items collection.
#[derive(Debug, Clone)]
pub struct ItemRepository {
    collection: Arc<RwLock<Collection>>,
}

impl ItemRepository {
    pub async fn attach(store: &DocumentStore) -> Result<Self> {
        Ok(Self {
            collection: store.collection(CollectionName::Items).await?,
        })
    }

    /// Insert a new item and return it with its assigned id.
    pub async fn insert(&self, item: &Item) -> Result<Item> {
        let doc = self
            .collection
            .write()
            .await
            .insert(models::to_document(item)?)
            .await?;
        models::from_document(doc)
    }

    /// Overwrite the stored fields of an existing item.
    pub async fn update(&self, id: &DocumentId, item: &Item) -> Result<()> {
        let doc = models::to_document(item)?;
        let Some(fields) = doc.as_object() else {
            return Err(Error::Validation("item must serialize to an object".to_string()));
        };
        let fields: Vec<(String, Value)> = fields
            .iter()
            .filter(|(name, _)| name.as_str() != "id")
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let updated = self
            .collection
            .write()
            .await
            .update(&Filter::eq("id", id.as_str()), &Update::set(fields), false)
            .await?;
        if updated == 0 {
            return Err(Error::NotFound(format!("item {id}")));
        }
        Ok(())
    }

    /// Count items matching the filters.
    pub async fn count(&self, filters: &ItemFilters) -> Result<usize> {
        let filter = filters.to_filter()?;
        Ok(self.collection.read().await.count(&filter))
    }

    /// List items matching the filters, with paging and optional sort.
    pub async fn find(
        &self,
        filters: &ItemFilters,
        skip: usize,
        limit: Option<usize>,
        sort: Option<&ItemSort>,
    ) -> Result<Vec<Item>> {
        let filter = filters.to_filter()?;
        let options = FindOptions {
            sort: sort.map(|s| (s.field.clone(), s.order)),
            skip,
            limit,
        };
        self.collection
            .read()
            .await
            .find(&filter, &options)
            .into_iter()
            .map(models::from_document)
            .collect()
    }

    /// Find items by creator code.
    pub async fn find_by_patreon(&self, patreon: &str) -> Result<Vec<Item>> {
        self.collection
            .read()
            .await
            .find(&Filter::eq("patreon", patreon), &FindOptions::default())
            .into_iter()
            .map(models::from_document)
            .collect()
    }

    /// Refresh the embedded category snapshot in every assigned item.
    pub async fn update_category(&self, category: &CategoryRef) -> Result<usize> {
        self.collection
            .write()
            .await
            .update(
                &Filter::eq("category.id", category.id.as_str()),
                &Update::set(vec![
                    ("category.name".to_string(), json!(category.name)),
                    ("category.color".to_string(), json!(category.color)),
                    ("category.dark".to_string(), json!(category.dark)),
                ]),
                true,
            )
            .await
    }

    /// Unassign a deleted category from every item referencing it.
    pub async fn delete_category(&self, id: &DocumentId) -> Result<usize> {
        self.collection
            .write()
            .await
            .update(
                &Filter::eq("category.id", id.as_str()),
                &Update::set(vec![("category".to_string(), Value::Null)]),
                true,
            )
            .await
    }

    /// Strip a deleted tag from every item carrying it.
    pub async fn delete_tag(&self, tag: &str) -> Result<usize> {
        self.collection
            .write()
            .await
            .update(&Filter::eq("tags", tag), &Update::pull("tags", tag), true)
            .await
    }

    /// Remove one item.
    pub async fn remove(&self, id: &DocumentId) -> Result<bool> {
        let removed = self
            .collection
            .write()
            .await
            .remove(&Filter::eq("id", id.as_str()), false)
            .await?;
        Ok(removed > 0)
    }
}

/// Repository for the tags collection.
#[derive(Debug, Clone)]
pub struct TagRepository {
    collection: Arc<RwLock<Collection>>,
}

impl TagRepository {
    pub async fn attach(store: &DocumentStore) -> Result<Self> {
        Ok(Self {
            collection: store.collection(CollectionName::Tags).await?,
        })
    }

    /// Add labels that are not stored yet; existing ones are left alone.
    pub async fn add(&self, labels: &[String]) -> Result<Vec<Tag>> {
        let mut collection = self.collection.write().await;
        let mut added = Vec::new();
        for label in labels {
            if collection.find_one(&Filter::eq("tag", label.as_str())).is_some() {
                continue;
            }
            let doc = collection.insert(json!({ "tag": label })).await?;
            added.push(models::from_document(doc)?);
        }
        Ok(added)
    }

    /// Remove a label.
    pub async fn remove(&self, label: &str) -> Result<bool> {
        let removed = self
            .collection
            .write()
            .await
            .remove(&Filter::eq("tag", label), false)
            .await?;
        Ok(removed > 0)
    }

    /// All stored labels, in insertion order.
    pub async fn find_all(&self) -> Result<Vec<Tag>> {
        self.collection
            .read()
            .await
            .find(&Filter::All, &FindOptions::default())
            .into_iter()
            .map(models::from_document)
            .collect()
    }
}

/// Repository for the categories collection.
#[derive(Debug, Clone)]
pub struct CategoryRepository {
    collection: Arc<RwLock<Collection>>,
}

impl CategoryRepository {
    pub async fn attach(store: &DocumentStore) -> Result<Self> {
        Ok(Self {
            collection: store.collection(CollectionName::Categories).await?,
        })
    }

    /// Insert a new category and return it with its assigned id.
    pub async fn add(&self, category: &Category) -> Result<Category> {
        let doc = self
            .collection
            .write()
            .await
            .insert(models::to_document(category)?)
            .await?;
        models::from_document(doc)
    }

    /// All categories, sorted by name.
    pub async fn find_all(&self) -> Result<Vec<Category>> {
        let options = FindOptions {
            sort: Some(("name".to_string(), SortOrder::Asc)),
            ..FindOptions::default()
        };
        self.collection
            .read()
            .await
            .find(&Filter::All, &options)
            .into_iter()
            .map(models::from_document)
            .collect()
    }

    /// Update the display fields of a category.
    pub async fn update(&self, id: &DocumentId, category: &Category) -> Result<()> {
        let updated = self
            .collection
            .write()
            .await
            .update(
                &Filter::eq("id", id.as_str()),
                &Update::set(vec![
                    ("name".to_string(), json!(category.name)),
                    ("color".to_string(), json!(category.color)),
                    ("dark".to_string(), json!(category.dark)),
                ]),
                false,
            )
            .await?;
        if updated == 0 {
            return Err(Error::NotFound(format!("category {id}")));
        }
        Ok(())
    }

    /// Remove one category.
    pub async fn remove(&self, id: &DocumentId) -> Result<bool> {
        let removed = self
            .collection
            .write()
            .await
            .remove(&Filter::eq("id", id.as_str()), false)
            .await?;
        Ok(removed > 0)
    }
}
