//! Local record bookkeeping.
//!
//! Local records are opaque JSON objects. The engine only owns the names of
//! the bookkeeping attributes below; everything else belongs to the server
//! schema.

use serde_json::{Map, Value};
use smartsync_query::parse_timestamp;

/// A local record.
pub type Record = Map<String, Value>;

/// Local surrogate key assigned by the store.
pub const SOUP_ENTRY_ID: &str = "_soupEntryId";
/// Set when any local change is pending.
pub const LOCAL: &str = "__local__";
/// Set when the record was created locally and is not on the server yet.
pub const LOCALLY_CREATED: &str = "__locally_created__";
/// Set when the record was updated locally.
pub const LOCALLY_UPDATED: &str = "__locally_updated__";
/// Set when the record was deleted locally.
pub const LOCALLY_DELETED: &str = "__locally_deleted__";
/// Last upload rejection message.
pub const LAST_ERROR: &str = "__last_error__";
/// Server metadata object carrying the record's `type`.
pub const ATTRIBUTES: &str = "attributes";

/// Default server id field.
pub const DEFAULT_ID_FIELD: &str = "Id";
/// Default server modification date field.
pub const DEFAULT_MODIFICATION_DATE_FIELD: &str = "LastModifiedDate";

const BOOKKEEPING: [&str; 7] = [
    SOUP_ENTRY_ID,
    LOCAL,
    LOCALLY_CREATED,
    LOCALLY_UPDATED,
    LOCALLY_DELETED,
    LAST_ERROR,
    ATTRIBUTES,
];

fn flag(record: &Value, name: &str) -> bool {
    record.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Returns true if the record has any pending local change.
pub fn is_dirty(record: &Value) -> bool {
    flag(record, LOCAL)
        || flag(record, LOCALLY_CREATED)
        || flag(record, LOCALLY_UPDATED)
        || flag(record, LOCALLY_DELETED)
}

/// Returns true if the record was created locally.
pub fn is_locally_created(record: &Value) -> bool {
    flag(record, LOCALLY_CREATED)
}

/// Returns true if the record was updated locally.
pub fn is_locally_updated(record: &Value) -> bool {
    flag(record, LOCALLY_UPDATED)
}

/// Returns true if the record was deleted locally.
pub fn is_locally_deleted(record: &Value) -> bool {
    flag(record, LOCALLY_DELETED)
}

/// Clears all local change flags and the last error.
pub fn mark_clean(record: &mut Record) {
    for name in [LOCAL, LOCALLY_CREATED, LOCALLY_UPDATED, LOCALLY_DELETED] {
        record.insert(name.to_string(), Value::Bool(false));
    }
    record.remove(LAST_ERROR);
}

/// Flags a record as created locally.
pub fn mark_locally_created(record: &mut Record) {
    record.insert(LOCAL.to_string(), Value::Bool(true));
    record.insert(LOCALLY_CREATED.to_string(), Value::Bool(true));
}

/// Flags a record as updated locally.
pub fn mark_locally_updated(record: &mut Record) {
    record.insert(LOCAL.to_string(), Value::Bool(true));
    record.insert(LOCALLY_UPDATED.to_string(), Value::Bool(true));
}

/// Flags a record as deleted locally.
pub fn mark_locally_deleted(record: &mut Record) {
    record.insert(LOCAL.to_string(), Value::Bool(true));
    record.insert(LOCALLY_DELETED.to_string(), Value::Bool(true));
}

/// Returns the local surrogate key of a stored record.
pub fn soup_entry_id(record: &Value) -> Option<i64> {
    record.get(SOUP_ENTRY_ID).and_then(Value::as_i64)
}

/// Returns a non-empty string field.
pub fn string_field<'a>(record: &'a Value, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Returns the remote object type from `attributes.type`.
pub fn object_type(record: &Value) -> Option<&str> {
    record
        .get(ATTRIBUTES)
        .and_then(|attributes| attributes.get("type"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Returns the modification time of a record in epoch milliseconds.
///
/// Accepts a timestamp string or a number of milliseconds.
pub fn modification_time(record: &Value, field: &str) -> Option<i64> {
    match record.get(field)? {
        Value::String(text) => parse_timestamp(text),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Returns true for attributes that are local bookkeeping or server
/// metadata rather than record data.
pub fn is_bookkeeping_field(field: &str) -> bool {
    BOOKKEEPING.contains(&field)
}
