//! Deep merge of JSON values
//!
//! Used for configuration layering and for combining mapped claims:
//! - Objects: merged by key, recursively
//! - Arrays: replaced (overlay wins entirely)
//! - Scalars and null: overlay wins

use serde_json::{Map, Value};

/// Merge `overlay` into `base` in place.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            merge_objects(base_map, overlay_map)
        }
        (base, overlay) => *base = overlay,
    }
}

/// Merge the keys of `overlay` into `base` in place.
pub fn merge_objects(base: &mut Map<String, Value>, overlay: Map<String, Value>) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        deep_merge(&mut merged, layer);
    }
    merged
}
