//! In-place merge of deserialized save data into live scopes.
//!
//! Fields present in the loaded data overwrite live fields. Fields absent from
//! it keep whatever the live table holds, which after a clear is the fresh
//! default, so a scope that gained fields since the save was written simply
//! keeps their defaults.

use crate::introspect::{self, Shape};
use crate::value::{Table, Value};

/// Merges `source` into `target`. Nothing is removed from `target`.
pub fn merge_into(target: &mut Table, source: Table) {
    for (key, incoming) in source {
        match target.get_mut(&key) {
            Some(existing) => merge_value(existing, incoming),
            None => {
                target.insert(key, incoming);
            }
        }
    }
}

fn merge_value(existing: &mut Value, incoming: Value) {
    match (existing, incoming) {
        (Value::Table(live), Value::Table(loaded)) if is_record(live) && is_record(&loaded) => {
            merge_into(live, loaded)
        }
        (Value::DefaultMap(live), Value::DefaultMap(loaded)) => live.replace_entries(loaded),
        (existing, incoming) => *existing = incoming,
    }
}

/// Tables merged field by field; sequences are replaced wholesale.
fn is_record(table: &Table) -> bool {
    matches!(
        introspect::classify(table),
        Shape::Associative | Shape::NumberKeyed
    )
}
