//! Typed query and update expressions.
//!
//! Filters and updates are closed enums instead of operator-shaped maps, so
//! every variant a collection has to evaluate is known at compile time.
//! Field paths use dotted notation (`category.id`).

use std::cmp::Ordering;

use regex::Regex;
use serde_json::Value;

/// Query filter over documents.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Matches every document.
    All,
    /// Field equals the value. Against an array field this means
    /// "contains the value"; `Eq(_, Null)` matches null or missing fields.
    Eq(String, Value),
    /// Field is greater than or equal to the value.
    Gte(String, Value),
    /// Field is a string matching the regex.
    Regex(String, Regex),
    /// All sub-filters match.
    And(Vec<Filter>),
}

impl Filter {
    /// Equality filter.
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(path.into(), value.into())
    }

    /// Range filter (`>=`).
    pub fn gte(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(path.into(), value.into())
    }

    /// Check whether a document matches this filter.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::All => true,
            Filter::Eq(path, value) => match resolve(doc, path) {
                None => value.is_null(),
                Some(field) => {
                    if field == value {
                        return true;
                    }
                    match field.as_array() {
                        Some(elements) => elements.iter().any(|e| e == value),
                        None => field.is_null() && value.is_null(),
                    }
                }
            },
            Filter::Gte(path, value) => match resolve(doc, path) {
                Some(field) => matches!(
                    compare_values(field, value),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                None => false,
            },
            Filter::Regex(path, regex) => resolve(doc, path)
                .and_then(Value::as_str)
                .map(|s| regex.is_match(s))
                .unwrap_or(false),
            Filter::And(filters) => filters.iter().all(|f| f.matches(doc)),
        }
    }
}

/// Update expression applied to matching documents.
#[derive(Debug, Clone)]
pub enum Update {
    /// Set each field path to the given value, creating missing
    /// intermediate objects.
    Set(Vec<(String, Value)>),
    /// Remove every element equal to the value from an array field.
    Pull(String, Value),
}

impl Update {
    pub fn set(fields: Vec<(String, Value)>) -> Self {
        Update::Set(fields)
    }

    pub fn pull(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Update::Pull(path.into(), value.into())
    }

    /// Apply this update to a document in place.
    pub fn apply(&self, doc: &mut Value) {
        match self {
            Update::Set(fields) => {
                for (path, value) in fields {
                    set_path(doc, path, value.clone());
                }
            }
            Update::Pull(path, value) => {
                if let Some(Value::Array(elements)) = resolve_mut(doc, path) {
                    elements.retain(|e| e != value);
                }
            }
        }
    }
}

/// Sort direction for find results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Options applied to a find operation after filtering.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort by a field path before paging.
    pub sort: Option<(String, SortOrder)>,
    /// Number of matching documents to skip.
    pub skip: usize,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl FindOptions {
    /// Apply sort, skip and limit to a result set.
    pub fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if let Some((field, order)) = &self.sort {
            docs.sort_by(|a, b| {
                let ordering = match (resolve(a, field), resolve(b, field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                };
                match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                }
            });
        }

        let mut docs: Vec<Value> = docs.into_iter().skip(self.skip).collect();
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Resolve a dotted field path within a document.
pub fn resolve<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn resolve_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object_mut()?.get_mut(segment)?;
    }
    Some(current)
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let Some(map) = current.as_object_mut() else {
            return;
        };
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
}

/// Compare two scalar values of the same kind.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item() -> Value {
        json!({
            "id": "a1",
            "name": "Starlit Grove",
            "rating": 4,
            "archived": false,
            "tags": ["rpg", "fantasy"],
            "category": {"id": "c1", "name": "Games"}
        })
    }

    #[test]
    fn test_eq_scalar_and_nested() {
        assert!(Filter::eq("name", "Starlit Grove").matches(&item()));
        assert!(Filter::eq("category.id", "c1").matches(&item()));
        assert!(!Filter::eq("category.id", "c2").matches(&item()));
    }

    #[test]
    fn test_eq_array_contains() {
        assert!(Filter::eq("tags", "rpg").matches(&item()));
        assert!(!Filter::eq("tags", "horror").matches(&item()));
    }

    #[test]
    fn test_eq_null_matches_missing_or_null() {
        let doc = json!({"id": "a", "category": null});
        assert!(Filter::eq("category", Value::Null).matches(&doc));
        let doc = json!({"id": "a"});
        assert!(Filter::eq("category", Value::Null).matches(&doc));
        assert!(!Filter::eq("category", Value::Null).matches(&item()));
    }

    #[test]
    fn test_gte() {
        assert!(Filter::gte("rating", 4).matches(&item()));
        assert!(Filter::gte("rating", 3).matches(&item()));
        assert!(!Filter::gte("rating", 5).matches(&item()));
        assert!(!Filter::gte("missing", 1).matches(&item()));
    }

    #[test]
    fn test_regex_case_insensitive() {
        let re = regex::RegexBuilder::new(&regex::escape("starlit"))
            .case_insensitive(true)
            .build()
            .unwrap();
        assert!(Filter::Regex("name".to_string(), re).matches(&item()));
    }

    #[test]
    fn test_and_composition() {
        let filter = Filter::And(vec![
            Filter::eq("archived", false),
            Filter::eq("tags", "rpg"),
            Filter::gte("rating", 4),
        ]);
        assert!(filter.matches(&item()));

        let filter = Filter::And(vec![
            Filter::eq("archived", true),
            Filter::eq("tags", "rpg"),
        ]);
        assert!(!filter.matches(&item()));
    }

    #[test]
    fn test_set_nested_field() {
        let mut doc = item();
        Update::set(vec![
            ("category.name".to_string(), json!("Renamed")),
            ("rating".to_string(), json!(5)),
        ])
        .apply(&mut doc);
        assert_eq!(doc["category"]["name"], "Renamed");
        assert_eq!(doc["rating"], 5);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut doc = json!({"id": "a"});
        Update::set(vec![("meta.source".to_string(), json!("import"))]).apply(&mut doc);
        assert_eq!(doc["meta"]["source"], "import");
    }

    #[test]
    fn test_pull_removes_all_equal_elements() {
        let mut doc = json!({"tags": ["a", "b", "a"]});
        Update::pull("tags", "a").apply(&mut doc);
        assert_eq!(doc["tags"], json!(["b"]));
    }

    #[test]
    fn test_find_options_sort_skip_limit() {
        let docs = vec![
            json!({"name": "c"}),
            json!({"name": "a"}),
            json!({"name": "b"}),
            json!({"name": "d"}),
        ];
        let options = FindOptions {
            sort: Some(("name".to_string(), SortOrder::Asc)),
            skip: 1,
            limit: Some(2),
        };
        let result = options.apply(docs);
        assert_eq!(result, vec![json!({"name": "b"}), json!({"name": "c"})]);
    }
}
