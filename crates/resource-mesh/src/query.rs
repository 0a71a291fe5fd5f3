//! # Query Matcher
//!
//! The one predicate behind both rule evaluation and `list` filtering. Event
//! driven matching and periodic reconciliation only agree on which resources
//! qualify for a rule because they both call [`matches`].
//!
//! ```rust
//! use resource_mesh::query::matches;
//! use serde_json::json;
//!
//! let document = json!({"status": "new", "priority": 2});
//! let matcher = json!({"status": "new"});
//! assert!(matches(matcher.as_object().unwrap(), document.as_object().unwrap()));
//! ```

use crate::model::{Document, Matcher};
use serde_json::Value;

/// Returns true iff every field of `matcher` is present in `document` with an
/// equal value. An empty matcher matches every document.
///
/// Numbers compare by value, so `1` and `1.0` are equal. Two integers compare
/// exactly, at any magnitude.
pub fn matches(matcher: &Matcher, document: &Document) -> bool {
    matcher.iter().all(|(field, expected)| {
        document
            .get(field)
            .is_some_and(|actual| values_equal(expected, actual))
    })
}

/// Like [`matches`], for events that carry no document (deletes). A missing
/// document behaves as an empty one.
pub fn matches_optional(matcher: &Matcher, document: Option<&Document>) -> bool {
    match document {
        Some(document) => matches(matcher, document),
        None => matcher.is_empty(),
    }
}

fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) if a.is_f64() || b.is_f64() => {
            matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y)
        }
        _ => expected == actual,
    }
}
