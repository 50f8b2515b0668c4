//! Recursive field-wise merge of step payloads.
//!
//! Repeated updates to the same step accumulate rather than overwrite: when
//! both sides hold a nested mapping the merge recurses key-by-key (incoming
//! keys win on conflict, existing-only keys survive), while scalars and
//! arrays are replaced wholesale.

use serde_json::Value;

use crate::models::{JsonMap, StepRecord, StepUpdate};

/// Merge `incoming` into `existing` in place.
pub fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Object(target), Value::Object(patch)) => merge_map(target, patch),
        (target, patch) => *target = patch,
    }
}

/// Merge `patch` into `target` key-by-key.
pub fn merge_map(target: &mut JsonMap, patch: JsonMap) {
    for (key, value) in patch {
        match target.get_mut(&key) {
            Some(slot) => merge_value(slot, value),
            None => {
                target.insert(key, value);
            }
        }
    }
}

fn merge_opt_map(target: &mut Option<JsonMap>, patch: Option<JsonMap>) {
    if let Some(patch) = patch {
        match target {
            Some(existing) => merge_map(existing, patch),
            None => *target = Some(patch),
        }
    }
}

impl StepRecord {
    /// Fold an update patch into this record. Scalar fields present in the
    /// patch replace the stored value; `data` and `test_data` merge
    /// recursively. Fields absent from the patch are left untouched.
    ///
    /// The patch is assumed validated and normalized; read-only fields on it
    /// are ignored here.
    pub fn apply_update(&mut self, patch: StepUpdate) {
        if let Some(result) = patch.result {
            self.result = Some(result);
        }
        if let Some(duration) = patch.duration {
            self.duration = Some(duration);
        }
        merge_opt_map(&mut self.data, patch.data);
        merge_opt_map(&mut self.test_data, patch.test_data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn as_map(value: Value) -> JsonMap {
        match value {
            Value::Object(map) => map,
            other => panic!("Expected object, got: {:?}", other),
        }
    }

    #[test]
    fn test_nested_maps_accumulate_keys() {
        let mut target = as_map(json!({ "test_data": { "v1": 1 } }));
        let patch = as_map(json!({ "test_data": { "v2": 2 } }));
        merge_map(&mut target, patch);
        assert_eq!(
            Value::Object(target),
            json!({ "test_data": { "v1": 1, "v2": 2 } })
        );
    }

    #[test]
    fn test_incoming_leaf_wins_on_conflict() {
        let mut target = as_map(json!({ "test_data": { "v1": 1 } }));
        let patch = as_map(json!({ "test_data": { "v1": 2 } }));
        merge_map(&mut target, patch);
        assert_eq!(Value::Object(target), json!({ "test_data": { "v1": 2 } }));
    }

    #[test]
    fn test_existing_only_fields_preserved() {
        let mut target = as_map(json!({ "kept": "yes", "nested": { "a": 1 } }));
        let patch = as_map(json!({ "nested": { "b": 2 } }));
        merge_map(&mut target, patch);
        assert_eq!(
            Value::Object(target),
            json!({ "kept": "yes", "nested": { "a": 1, "b": 2 } })
        );
    }

    #[test]
    fn test_scalar_replaces_map_wholesale() {
        let mut target = as_map(json!({ "field": { "a": 1 } }));
        let patch = as_map(json!({ "field": "flat" }));
        merge_map(&mut target, patch);
        assert_eq!(Value::Object(target), json!({ "field": "flat" }));
    }

    #[test]
    fn test_map_replaces_scalar_wholesale() {
        let mut target = as_map(json!({ "field": "flat" }));
        let patch = as_map(json!({ "field": { "a": 1 } }));
        merge_map(&mut target, patch);
        assert_eq!(Value::Object(target), json!({ "field": { "a": 1 } }));
    }

    #[test]
    fn test_arrays_replace_not_concatenate() {
        let mut target = as_map(json!({ "field": [1, 2] }));
        let patch = as_map(json!({ "field": [3] }));
        merge_map(&mut target, patch);
        assert_eq!(Value::Object(target), json!({ "field": [3] }));
    }

    #[test]
    fn test_deeply_nested_merge() {
        let mut target = as_map(json!({ "a": { "b": { "c": 1, "keep": true } } }));
        let patch = as_map(json!({ "a": { "b": { "c": 2, "d": 3 } } }));
        merge_map(&mut target, patch);
        assert_eq!(
            Value::Object(target),
            json!({ "a": { "b": { "c": 2, "d": 3, "keep": true } } })
        );
    }

    // Associativity over disjoint leaf fields: merge(merge(A,B),C) ==
    // merge(A, merge(B,C)).
    #[test]
    fn test_merge_associative_on_disjoint_fields() {
        let a = as_map(json!({ "x": { "a": 1 } }));
        let b = as_map(json!({ "x": { "b": 2 } }));
        let c = as_map(json!({ "x": { "c": 3 } }));

        let mut left = a.clone();
        merge_map(&mut left, b.clone());
        merge_map(&mut left, c.clone());

        let mut bc = b;
        merge_map(&mut bc, c);
        let mut right = a;
        merge_map(&mut right, bc);

        assert_eq!(left, right);
    }

    fn make_record() -> StepRecord {
        StepRecord {
            uuid: Uuid::new_v4(),
            job_id: "job-1".to_string(),
            name: "step".to_string(),
            classname: "case".to_string(),
            position: Some(1),
            class_position: Some(1),
            result: Some("created".to_string()),
            duration: None,
            data: Some(as_map(json!({ "env": "ci" }))),
            test_data: Some(as_map(json!({ "v1": 1 }))),
            number: 0,
            added_step: None,
        }
    }

    #[test]
    fn test_apply_update_replaces_scalars() {
        let mut record = make_record();
        record.apply_update(StepUpdate {
            result: Some("passed".to_string()),
            duration: Some(4.2),
            ..Default::default()
        });
        assert_eq!(record.result.as_deref(), Some("passed"));
        assert_eq!(record.duration, Some(4.2));
    }

    #[test]
    fn test_apply_update_accumulates_test_data() {
        let mut record = make_record();
        record.apply_update(StepUpdate {
            test_data: Some(as_map(json!({ "v2": 2 }))),
            ..Default::default()
        });
        assert_eq!(
            record.test_data,
            Some(as_map(json!({ "v1": 1, "v2": 2 })))
        );
    }

    #[test]
    fn test_apply_update_preserves_unrelated_data_keys() {
        let mut record = make_record();
        record.apply_update(StepUpdate {
            data: Some(as_map(json!({ "status": "known_bug" }))),
            ..Default::default()
        });
        assert_eq!(
            record.data,
            Some(as_map(json!({ "env": "ci", "status": "known_bug" })))
        );
    }

    #[test]
    fn test_apply_update_absent_fields_untouched() {
        let mut record = make_record();
        let before = record.clone();
        record.apply_update(StepUpdate::default());
        assert_eq!(record, before);
    }
}
