//! Local record store abstraction.
//!
//! The engine reads and writes local records through [`LocalStore`]. Each
//! call is a single write against one collection; implementations must
//! apply a batch passed to [`LocalStore::upsert`] or [`LocalStore::delete`]
//! atomically.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{StoreError, SyncResult};
use crate::record::SOUP_ENTRY_ID;

/// How [`LocalStore::upsert`] matches incoming records to stored ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertKey<'a> {
    /// Match on the local surrogate key; records without one are inserted.
    EntryId,
    /// Match on an external id field, falling back to the surrogate key.
    Field(&'a str),
}

/// Record filter for store queries.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreFilter {
    /// Every record.
    All,
    /// `field == value`.
    Equals(String, Value),
    /// `field` equals one of the values.
    In(String, Vec<Value>),
    /// `field` is present and not null.
    NotNull(String),
    /// `field` is the boolean `true`.
    IsTrue(String),
    /// Negation.
    Not(Box<StoreFilter>),
    /// Conjunction.
    And(Vec<StoreFilter>),
    /// Disjunction.
    Any(Vec<StoreFilter>),
}

impl StoreFilter {
    /// Returns true if `record` passes the filter.
    pub fn matches(&self, record: &Value) -> bool {
        match self {
            StoreFilter::All => true,
            StoreFilter::Equals(field, value) => record.get(field) == Some(value),
            StoreFilter::In(field, values) => record
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| candidate == v)),
            StoreFilter::NotNull(field) => record.get(field).is_some_and(|v| !v.is_null()),
            StoreFilter::IsTrue(field) => record.get(field) == Some(&Value::Bool(true)),
            StoreFilter::Not(inner) => !inner.matches(record),
            StoreFilter::And(filters) => filters.iter().all(|f| f.matches(record)),
            StoreFilter::Any(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}

/// A paged query over one collection, ordered by surrogate key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    /// Collection name.
    pub collection: String,
    /// Row filter.
    pub filter: StoreFilter,
    /// Fields to return; `None` returns whole records.
    pub projection: Option<Vec<String>>,
    /// Rows per page.
    pub page_size: usize,
}

impl StoreQuery {
    /// Creates a query returning every record of `collection`.
    pub fn all(collection: impl Into<String>, page_size: usize) -> Self {
        Self {
            collection: collection.into(),
            filter: StoreFilter::All,
            projection: None,
            page_size: page_size.max(1),
        }
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: StoreFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Restricts the returned fields.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Local store of JSON records grouped in named collections.
pub trait LocalStore: Send + Sync {
    /// Returns true if the collection exists.
    fn has_collection(&self, collection: &str) -> bool;

    /// Creates the collection if it does not exist.
    fn create_collection(&self, collection: &str) -> SyncResult<()>;

    /// Inserts or replaces records and returns them as stored, each carrying
    /// its surrogate key in `_soupEntryId`.
    fn upsert(
        &self,
        collection: &str,
        records: Vec<Value>,
        key: UpsertKey<'_>,
    ) -> SyncResult<Vec<Value>>;

    /// Returns the records with the given surrogate keys, skipping unknown ones.
    fn retrieve(&self, collection: &str, ids: &[i64]) -> SyncResult<Vec<Value>>;

    /// Deletes the records with the given surrogate keys.
    fn delete(&self, collection: &str, ids: &[i64]) -> SyncResult<()>;

    /// Returns the first record whose `field` equals `value`.
    fn lookup(&self, collection: &str, field: &str, value: &Value) -> SyncResult<Option<Value>>;

    /// Counts the records matching the query filter.
    fn count(&self, query: &StoreQuery) -> SyncResult<usize>;

    /// Returns one page (0-indexed) of matching records.
    fn query_page(&self, query: &StoreQuery, page_index: usize) -> SyncResult<Vec<Value>>;
}

/// Reads every page of a query.
pub fn collect_all(store: &dyn LocalStore, query: &StoreQuery) -> SyncResult<Vec<Value>> {
    let mut rows = Vec::new();
    let mut page_index = 0;
    loop {
        let page = store.query_page(query, page_index)?;
        let len = page.len();
        rows.extend(page);
        if len < query.page_size {
            return Ok(rows);
        }
        page_index += 1;
    }
}

#[derive(Debug, Default)]
struct MemoryCollection {
    next_id: i64,
    records: BTreeMap<i64, Value>,
}

impl MemoryCollection {
    fn find(&self, field: &str, value: &Value) -> Option<i64> {
        self.records
            .iter()
            .find(|(_, record)| record.get(field) == Some(value))
            .map(|(id, _)| *id)
    }
}

/// An in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record of a collection, ordered by surrogate key.
    pub fn records(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .get(collection)
            .map(|c| c.records.values().cloned().collect())
            .unwrap_or_default()
    }
}

fn project(record: &Value, projection: Option<&[String]>) -> Value {
    match projection {
        None => record.clone(),
        Some(fields) => Value::Object(
            fields
                .iter()
                .map(|f| (f.clone(), record.get(f).cloned().unwrap_or(Value::Null)))
                .collect(),
        ),
    }
}

impl LocalStore for MemoryStore {
    fn has_collection(&self, collection: &str) -> bool {
        self.collections.read().contains_key(collection)
    }

    fn create_collection(&self, collection: &str) -> SyncResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_insert_with(|| MemoryCollection {
                next_id: 1,
                records: BTreeMap::new(),
            });
        Ok(())
    }

    fn upsert(
        &self,
        collection: &str,
        records: Vec<Value>,
        key: UpsertKey<'_>,
    ) -> SyncResult<Vec<Value>> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        if records.iter().any(|r| !r.is_object()) {
            return Err(StoreError::NotAnObject {
                collection: collection.to_string(),
            }
            .into());
        }

        let mut stored = Vec::with_capacity(records.len());
        for mut record in records {
            let by_field = match key {
                UpsertKey::Field(field) => record
                    .get(field)
                    .filter(|v| !v.is_null())
                    .and_then(|v| target.find(field, v)),
                UpsertKey::EntryId => None,
            };
            let existing = by_field.or_else(|| {
                record
                    .get(SOUP_ENTRY_ID)
                    .and_then(Value::as_i64)
                    .filter(|id| target.records.contains_key(id))
            });
            let id = existing.unwrap_or_else(|| {
                let id = target.next_id;
                target.next_id += 1;
                id
            });
            if let Value::Object(map) = &mut record {
                map.insert(SOUP_ENTRY_ID.to_string(), Value::from(id));
            }
            target.records.insert(id, record.clone());
            stored.push(record);
        }
        Ok(stored)
    }

    fn retrieve(&self, collection: &str, ids: &[i64]) -> SyncResult<Vec<Value>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(ids
            .iter()
            .filter_map(|id| target.records.get(id).cloned())
            .collect())
    }

    fn delete(&self, collection: &str, ids: &[i64]) -> SyncResult<()> {
        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        for id in ids {
            target.records.remove(id);
        }
        Ok(())
    }

    fn lookup(&self, collection: &str, field: &str, value: &Value) -> SyncResult<Option<Value>> {
        let collections = self.collections.read();
        let target = collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(target
            .find(field, value)
            .and_then(|id| target.records.get(&id).cloned()))
    }

    fn count(&self, query: &StoreQuery) -> SyncResult<usize> {
        let collections = self.collections.read();
        let target = collections
            .get(&query.collection)
            .ok_or_else(|| StoreError::CollectionNotFound(query.collection.clone()))?;
        Ok(target
            .records
            .values()
            .filter(|r| query.filter.matches(r))
            .count())
    }

    fn query_page(&self, query: &StoreQuery, page_index: usize) -> SyncResult<Vec<Value>> {
        let collections = self.collections.read();
        let target = collections
            .get(&query.collection)
            .ok_or_else(|| StoreError::CollectionNotFound(query.collection.clone()))?;
        let page_size = query.page_size.max(1);
        Ok(target
            .records
            .values()
            .filter(|r| query.filter.matches(r))
            .skip(page_index.saturating_mul(page_size))
            .take(page_size)
            .map(|r| project(r, query.projection.as_deref()))
            .collect())
    }
}
