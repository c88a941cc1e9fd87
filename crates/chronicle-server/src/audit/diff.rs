//! Field-level diffing between two document snapshots
//!
//! Values are compared by deep equality at the top level; nested objects are
//! not merged. The update path produces a minimal before/after pair holding
//! only the keys whose values genuinely differ.

use tracing::debug;

use crate::store::{Document, UPDATED_AT_KEY};

use super::models::{ChangeOrigin, Changes};

/// Per-key classification of the difference between two documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailedDiff {
    /// Keys present only in `after`
    pub added: Vec<String>,
    /// Keys present in both with different values
    pub updated: Vec<String>,
    /// Keys present only in `before`
    pub removed: Vec<String>,
}

impl DetailedDiff {
    /// Union of all changed keys, in before-then-after iteration order.
    pub fn changed_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.added.len() + self.updated.len() + self.removed.len());
        keys.extend(self.removed.iter().cloned());
        keys.extend(self.updated.iter().cloned());
        keys.extend(self.added.iter().cloned());
        keys
    }
}

/// Classify every top-level key of `before` and `after`.
pub fn detailed_diff(before: &Document, after: &Document) -> DetailedDiff {
    let mut diff = DetailedDiff::default();

    for (key, before_value) in before {
        match after.get(key) {
            None => diff.removed.push(key.clone()),
            Some(after_value) if after_value != before_value => diff.updated.push(key.clone()),
            Some(_) => {},
        }
    }
    for key in after.keys() {
        if !before.contains_key(key) {
            diff.added.push(key.clone());
        }
    }

    diff
}

/// Build the changes for an update operation.
///
/// With a snapshot, the result holds only the keys whose before/after values
/// differ. Without one, the requested payload is reported verbatim and tagged
/// [`ChangeOrigin::Payload`] so consumers can tell "what changed" apart from
/// "what was asked for".
///
/// The last-modified timestamp is snapshotted for drift detection but kept
/// out of the reported delta unless the request set it explicitly.
pub fn update_changes(snapshot: Option<Document>, requested: Document) -> Changes {
    let Some(before) = snapshot else {
        return Changes::requested(requested);
    };

    let diff = detailed_diff(&before, &requested);

    let mut before_changed = Document::new();
    let mut after_changed = Document::new();
    for key in diff.changed_keys() {
        if key == UPDATED_AT_KEY && !requested.contains_key(UPDATED_AT_KEY) {
            debug!(
                previous = ?before.get(UPDATED_AT_KEY),
                "Dropping last-modified drift marker from delta"
            );
            continue;
        }
        if let Some(value) = before.get(&key) {
            before_changed.insert(key.clone(), value.clone());
        }
        if let Some(value) = requested.get(&key) {
            after_changed.insert(key.clone(), value.clone());
        }
    }

    Changes {
        before: before_changed,
        after: after_changed,
        origin: ChangeOrigin::Diff,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn classifies_added_updated_removed() {
        let before = doc(json!({"a": 1, "b": 2, "c": 3}));
        let after = doc(json!({"b": 2, "c": 9, "d": 4}));
        let diff = detailed_diff(&before, &after);

        assert_eq!(diff.removed, vec!["a".to_string()]);
        assert_eq!(diff.updated, vec!["c".to_string()]);
        assert_eq!(diff.added, vec!["d".to_string()]);
    }

    #[test]
    fn nested_values_compared_by_deep_equality() {
        let before = doc(json!({"address": {"city": "Oslo", "zip": "0150"}}));
        let same = doc(json!({"address": {"zip": "0150", "city": "Oslo"}}));
        assert_eq!(detailed_diff(&before, &same), DetailedDiff::default());

        let moved = doc(json!({"address": {"city": "Bergen", "zip": "0150"}}));
        assert_eq!(detailed_diff(&before, &moved).updated, vec!["address".to_string()]);
    }

    #[test]
    fn update_changes_keeps_only_changed_keys() {
        let snapshot = doc(json!({"firstName": "Alice", "lastName": "Smith"}));
        let requested = doc(json!({"firstName": "Bob", "lastName": "Smith"}));

        let changes = update_changes(Some(snapshot), requested);
        assert_eq!(changes.origin, ChangeOrigin::Diff);
        assert_eq!(changes.before, doc(json!({"firstName": "Alice"})));
        assert_eq!(changes.after, doc(json!({"firstName": "Bob"})));
    }

    #[test]
    fn update_changes_drops_untouched_timestamp() {
        let snapshot = doc(json!({"firstName": "Alice", "updatedAt": "2026-01-01T00:00:00Z"}));
        let requested = doc(json!({"firstName": "Bob"}));

        let changes = update_changes(Some(snapshot), requested);
        assert!(!changes.before.contains_key("updatedAt"));
        assert!(!changes.after.contains_key("updatedAt"));
        assert_eq!(changes.after, doc(json!({"firstName": "Bob"})));
    }

    #[test]
    fn update_changes_keeps_explicitly_set_timestamp() {
        let snapshot = doc(json!({"updatedAt": "old"}));
        let requested = doc(json!({"updatedAt": "new"}));

        let changes = update_changes(Some(snapshot), requested);
        assert_eq!(changes.before, doc(json!({"updatedAt": "old"})));
        assert_eq!(changes.after, doc(json!({"updatedAt": "new"})));
    }

    #[test]
    fn missing_snapshot_reports_payload_verbatim() {
        let requested = doc(json!({"firstName": "Bob", "status": "ACTIVE"}));
        let changes = update_changes(None, requested.clone());

        assert_eq!(changes.origin, ChangeOrigin::Payload);
        assert!(changes.before.is_empty());
        assert_eq!(changes.after, requested);
    }

    #[test]
    fn identical_states_produce_empty_changes() {
        let snapshot = doc(json!({"firstName": "Alice", "updatedAt": "t"}));
        let requested = doc(json!({"firstName": "Alice"}));

        let changes = update_changes(Some(snapshot), requested);
        assert!(changes.is_empty());
    }
}
