//! Update payloads
//!
//! An update is either an operator document (`{"$set": {...}}`) or a plain
//! field map; both assign top-level fields. Operator keys other than `$set`
//! are not interpreted by the store and are ignored on apply.

use serde_json::Value as JsonValue;

use super::{now_timestamp, Document, UPDATED_AT_KEY};

const SET_KEY: &str = "$set";

/// A requested modification to a single document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSpec(serde_json::Map<String, JsonValue>);

impl UpdateSpec {
    pub fn new(map: serde_json::Map<String, JsonValue>) -> Self {
        Self(map)
    }

    /// Build a `{"$set": fields}` update.
    pub fn set(fields: serde_json::Map<String, JsonValue>) -> Self {
        let mut map = serde_json::Map::new();
        map.insert(SET_KEY.to_string(), JsonValue::Object(fields));
        Self(map)
    }

    pub fn as_map(&self) -> &serde_json::Map<String, JsonValue> {
        &self.0
    }

    /// The effective field assignments: the `$set` payload merged with any
    /// plain (non-operator) top-level entries.
    pub fn set_fields(&self) -> Document {
        let mut fields = Document::new();
        for (key, value) in &self.0 {
            if key == SET_KEY {
                if let Some(set) = value.as_object() {
                    for (set_key, set_value) in set {
                        fields.insert(set_key.clone(), set_value.clone());
                    }
                }
            } else if !key.starts_with('$') {
                fields.insert(key.clone(), value.clone());
            }
        }
        fields
    }

    /// Field names this update touches: plain top-level keys plus the keys
    /// under `$set`. Operator pseudo-keys themselves are excluded.
    pub fn tracked_keys(&self) -> Vec<String> {
        self.set_fields().keys().cloned().collect()
    }

    /// Apply the assignments to `doc`, bumping the last-modified timestamp
    /// unless the update set it explicitly.
    pub fn apply(&self, doc: &mut Document) {
        let fields = self.set_fields();
        let touched_timestamp = fields.contains_key(UPDATED_AT_KEY);
        for (key, value) in fields {
            doc.insert(key, value);
        }
        if !touched_timestamp {
            doc.insert(UPDATED_AT_KEY.to_string(), now_timestamp());
        }
    }
}

impl From<serde_json::Map<String, JsonValue>> for UpdateSpec {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        Self::new(map)
    }
}
