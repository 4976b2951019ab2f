//! JSON merge patch (RFC 7386).
//!
//! [`diff`] builds the patch that turns `base` into `target`, carrying only
//! the fields that differ; removed fields are sent as `null`. [`apply`] merges
//! such a patch into a stored document.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ClientError;

/// Merge patch from `base` to `target`. Empty object when they are equal.
pub fn diff(base: &Value, target: &Value) -> Value {
    match (base, target) {
        (Value::Object(base), Value::Object(target)) => Value::Object(diff_objects(base, target)),
        _ => target.clone(),
    }
}

fn diff_objects(base: &Map<String, Value>, target: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = Map::new();

    for key in base.keys() {
        if !target.contains_key(key) {
            patch.insert(key.clone(), Value::Null);
        }
    }

    for (key, new) in target {
        match base.get(key) {
            Some(old) if old == new => {}
            Some(Value::Object(old)) if new.is_object() => {
                if let Value::Object(new) = new {
                    let nested = diff_objects(old, new);
                    if !nested.is_empty() {
                        patch.insert(key.clone(), Value::Object(nested));
                    }
                }
            }
            _ => {
                patch.insert(key.clone(), new.clone());
            }
        }
    }

    patch
}

/// Merge `patch` into `doc` in place.
pub fn apply(doc: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *doc = patch.clone();
        return;
    };

    if !doc.is_object() {
        *doc = Value::Object(Map::new());
    }
    if let Value::Object(doc) = doc {
        for (key, value) in patch {
            if value.is_null() {
                doc.remove(key);
            } else {
                apply(doc.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Merge patch between two typed objects.
pub fn diff_objects_of<T: Serialize>(base: &T, target: &T) -> Result<Value, ClientError> {
    Ok(diff(&serde_json::to_value(base)?, &serde_json::to_value(target)?))
}

/// True when `patch` would not change anything.
pub fn is_empty(patch: &Value) -> bool {
    matches!(patch, Value::Object(map) if map.is_empty())
}
