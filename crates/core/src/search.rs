//! Key and path lookups over an execution context.
//!
//! All three strategies return `None` as the absent sentinel; a key that is
//! present with a JSON `null` value is a match (`Some(&Value::Null)`).
//!
//! When a key occurs more than once, the recursive and iterative searches
//! may disagree: the recursive form is depth-first in document order, the
//! iterative form pops its work stack LIFO and so visits later siblings
//! first. Use [`search_context_path`] when the location is known.

use serde_json::Value;

/// Path separator for [`search_context_path`].
pub const PATH_SEPARATOR: char = '.';

/// Depth-first search for `key`.
///
/// At each mapping the key itself is checked before descending into the
/// values in document order; sequences are searched element by element.
pub fn search_context<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key) {
                return Some(found);
            }
            map.values().find_map(|child| search_context(child, key))
        }
        Value::Array(items) => items.iter().find_map(|item| search_context(item, key)),
        _ => None,
    }
}

/// Stack-based search for `key`, safe on arbitrarily deep documents.
pub fn search_context_iterative<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let mut stack = vec![value];

    while let Some(current) = stack.pop() {
        match current {
            Value::Object(map) => {
                if let Some(found) = map.get(key) {
                    return Some(found);
                }
                stack.extend(map.values().filter(|v| is_container(v)));
            }
            Value::Array(items) => stack.extend(items.iter().filter(|v| is_container(v))),
            _ => {}
        }
    }
    None
}

/// Walk a dot-delimited path through nested mappings.
///
/// Only mappings are traversed: a missing segment, or a segment reached
/// through a non-mapping value (including sequences), yields `None`.
pub fn search_context_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split(PATH_SEPARATOR)
        .try_fold(value, |current, segment| current.as_object()?.get(segment))
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
