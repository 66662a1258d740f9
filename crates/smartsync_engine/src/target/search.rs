//! Full-text search target.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{string_ids, tagged, DownloadTarget, QueryCore, SyncContext};
use crate::error::{SyncError, SyncResult};

/// Downloads the results of a search, as a single page.
///
/// Searches cannot be restricted by modification date, so every run
/// fetches the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTarget {
    query: String,
    #[serde(flatten)]
    core: QueryCore,
}

impl SearchTarget {
    /// Creates a target for a search string.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            core: QueryCore::default(),
        }
    }

    /// The search string.
    pub fn query(&self) -> &str {
        &self.query
    }

    fn search(&self, ctx: &SyncContext<'_>) -> SyncResult<Vec<Value>> {
        search_records(ctx.remote.search(&self.query)?)
    }
}

/// Extracts the records of a search response: a flat array, or an object
/// with `records` or `searchRecords`.
fn search_records(response: Value) -> SyncResult<Vec<Value>> {
    match response {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => ["records", "searchRecords"]
            .into_iter()
            .find_map(|key| match map.remove(key) {
                Some(Value::Array(records)) => Some(records),
                _ => None,
            })
            .ok_or_else(|| SyncError::Protocol("search response has no records".into())),
        _ => Err(SyncError::Protocol("unexpected search response".into())),
    }
}

impl DownloadTarget for SearchTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        _max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        let records = self.search(ctx)?;
        self.core.set_total_size(records.len() as i64);
        self.core.clear_cursor();
        Ok(records)
    }

    fn continue_fetch(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>> {
        Ok(None)
    }

    fn total_size(&self) -> i64 {
        self.core.total_size()
    }

    fn id_field(&self) -> &str {
        self.core.id_field()
    }

    fn modification_date_field(&self) -> &str {
        self.core.modification_date_field()
    }

    fn remote_ids(&mut self, ctx: &SyncContext<'_>) -> SyncResult<HashSet<String>> {
        let records = self.search(ctx)?;
        Ok(string_ids(&records, self.core.id_field()).into_iter().collect())
    }

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "sosl")
    }
}
