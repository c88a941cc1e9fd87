//! Mongo-shaped selection filters
//!
//! A filter is a JSON object mapping field names to conditions. Supported
//! conditions: direct equality (deep), `{"$regex": "...", "$options": "i"}`,
//! and a top-level `"$or"` of sub-filters. This is the subset the account
//! service's query builder produces.

use serde_json::Value as JsonValue;
use tracing::warn;

use super::Document;

const OR_KEY: &str = "$or";
const REGEX_KEY: &str = "$regex";
const OPTIONS_KEY: &str = "$options";

/// A selection filter over documents in one collection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Filter(serde_json::Map<String, JsonValue>);

impl Filter {
    pub fn new(map: serde_json::Map<String, JsonValue>) -> Self {
        Self(map)
    }

    /// Filter selecting a single document by `_id`.
    pub fn by_id(id: impl AsRef<str>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(
            super::ID_KEY.to_string(),
            JsonValue::String(id.as_ref().to_string()),
        );
        Self(map)
    }

    /// The empty filter, matching every document.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, JsonValue> {
        &self.0
    }

    /// When the filter is a plain `_id` equality, the id it selects. Lets the
    /// Postgres backend hit the primary key instead of scanning a collection.
    pub fn id_equality(&self) -> Option<&str> {
        match self.0.get(super::ID_KEY) {
            Some(JsonValue::String(id)) => Some(id),
            _ => None,
        }
    }

    /// Deterministic serialization of the filter, used as the snapshot cache
    /// key. `serde_json`'s map keeps keys sorted, so equal filters always
    /// produce equal keys.
    pub fn cache_key(&self) -> String {
        JsonValue::Object(self.0.clone()).to_string()
    }

    /// Whether `doc` satisfies every clause of this filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.0.iter().all(|(key, condition)| {
            if key == OR_KEY {
                or_matches(doc, condition)
            } else {
                condition_matches(doc.get(key), condition)
            }
        })
    }
}

impl From<serde_json::Map<String, JsonValue>> for Filter {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        Self::new(map)
    }
}

fn or_matches(doc: &Document, clauses: &JsonValue) -> bool {
    match clauses {
        JsonValue::Array(alternatives) => alternatives.iter().any(|clause| {
            clause
                .as_object()
                .map(|map| Filter::new(map.clone()).matches(doc))
                .unwrap_or(false)
        }),
        _ => false,
    }
}

fn condition_matches(actual: Option<&JsonValue>, condition: &JsonValue) -> bool {
    if let Some(object) = condition.as_object() {
        if let Some(pattern) = object.get(REGEX_KEY).and_then(JsonValue::as_str) {
            let case_insensitive = object
                .get(OPTIONS_KEY)
                .and_then(JsonValue::as_str)
                .map(|options| options.contains('i'))
                .unwrap_or(false);
            return regex_matches(actual, pattern, case_insensitive);
        }
    }

    match actual {
        Some(value) => value == condition,
        None => condition.is_null(),
    }
}

fn regex_matches(actual: Option<&JsonValue>, pattern: &str, case_insensitive: bool) -> bool {
    let Some(haystack) = actual.and_then(JsonValue::as_str) else {
        return false;
    };
    match regex::RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
    {
        Ok(re) => re.is_match(haystack),
        Err(error) => {
            warn!(pattern, %error, "Ignoring unparseable $regex condition");
            false
        },
    }
}
