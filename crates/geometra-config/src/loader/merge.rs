//! Layer merging for the effective config document.

use serde_json::Value;

/// Overlay `upper` onto `base`.
///
/// Objects merge key by key. A `null` in `upper` removes the key so the
/// field falls back to its default; any other value replaces the base.
pub(super) fn merge_json_values(base: &mut Value, upper: &Value) {
    match (base, upper) {
        (Value::Object(base_map), Value::Object(upper_map)) => {
            for (key, value) in upper_map {
                if value.is_null() {
                    base_map.remove(key);
                } else if let Some(existing) = base_map.get_mut(key) {
                    merge_json_values(existing, value);
                } else {
                    base_map.insert(key.clone(), value.clone());
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}
