//! Plain query target and the query state shared by every variant.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_query::{add_filter_for_resync, QueryMutator};

use super::{latest_time_stamp, string_ids, tagged, DownloadTarget, SyncContext};
use crate::error::{SyncError, SyncResult};
use crate::record::{DEFAULT_ID_FIELD, DEFAULT_MODIFICATION_DATE_FIELD};
use crate::remote::RemoteService;

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

fn default_modification_date_field() -> String {
    DEFAULT_MODIFICATION_DATE_FIELD.to_string()
}

fn unknown_total() -> i64 {
    -1
}

/// Field names, incremental filter and pagination cursor shared by the
/// query-based targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCore {
    #[serde(rename = "idFieldName", default = "default_id_field")]
    id_field: String,
    #[serde(
        rename = "modificationDateFieldName",
        default = "default_modification_date_field"
    )]
    modification_date_field: String,
    #[serde(skip, default = "unknown_total")]
    total_size: i64,
    #[serde(skip)]
    next_records_url: Option<String>,
}

impl Default for QueryCore {
    fn default() -> Self {
        Self::new(DEFAULT_ID_FIELD, DEFAULT_MODIFICATION_DATE_FIELD)
    }
}

impl QueryCore {
    /// Creates a core with explicit field names.
    pub fn new(id_field: impl Into<String>, modification_date_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            modification_date_field: modification_date_field.into(),
            total_size: -1,
            next_records_url: None,
        }
    }

    /// Server id field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Server modification date field.
    pub fn modification_date_field(&self) -> &str {
        &self.modification_date_field
    }

    /// Total size reported by the last `start`.
    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    pub(crate) fn set_total_size(&mut self, total_size: i64) {
        self.total_size = total_size;
    }

    pub(crate) fn set_fields(&mut self, id_field: &str, modification_date_field: &str) {
        self.id_field = id_field.to_string();
        self.modification_date_field = modification_date_field.to_string();
    }

    /// Restricts `query` to records modified after `max_time_stamp`.
    pub fn incremental_query(&self, query: &str, max_time_stamp: i64) -> String {
        add_filter_for_resync(query, &self.modification_date_field, max_time_stamp)
    }

    /// Runs `query`, records its total size and pagination cursor and
    /// returns the first page.
    pub fn start(&mut self, remote: &dyn RemoteService, query: &str) -> SyncResult<Vec<Value>> {
        let response = remote.query(query)?;
        self.total_size = response.total_size;
        self.next_records_url = response.next_records_url;
        Ok(response.records)
    }

    /// Follows the cursor, or returns `None` past the last page.
    pub fn more(&mut self, remote: &dyn RemoteService) -> SyncResult<Option<Vec<Value>>> {
        let Some(url) = self.next_records_url.take() else {
            return Ok(None);
        };
        let response = remote.query_more(&url)?;
        self.next_records_url = response.next_records_url;
        Ok(Some(response.records))
    }

    /// Returns true while another page is available.
    pub fn has_more(&self) -> bool {
        self.next_records_url.is_some()
    }

    pub(crate) fn clear_cursor(&mut self) {
        self.next_records_url = None;
    }

    /// Runs `query` and follows every page without touching the cursor.
    pub fn fetch_all(&self, remote: &dyn RemoteService, query: &str) -> SyncResult<Vec<Value>> {
        let mut response = remote.query(query)?;
        let mut records = std::mem::take(&mut response.records);
        while let Some(url) = response.next_records_url.take() {
            response = remote.query_more(&url)?;
            records.append(&mut response.records);
        }
        Ok(records)
    }

    /// Runs an ids-only query and returns the id set.
    pub fn collect_ids(
        &self,
        remote: &dyn RemoteService,
        query: &str,
    ) -> SyncResult<HashSet<String>> {
        let records = self.fetch_all(remote, query)?;
        Ok(string_ids(&records, &self.id_field).into_iter().collect())
    }

    pub(crate) fn latest_time_stamp(&self, records: &[Value]) -> i64 {
        latest_time_stamp(records, &self.modification_date_field)
    }
}

/// Downloads the records matched by a query.
///
/// The id and modification date fields are added to the select list when
/// missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    query: String,
    #[serde(flatten)]
    core: QueryCore,
}

impl QueryTarget {
    /// Creates a target with the default field names.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            core: QueryCore::default(),
        }
    }

    /// Overrides the id and modification date field names.
    pub fn with_fields(
        mut self,
        id_field: impl Into<String>,
        modification_date_field: impl Into<String>,
    ) -> Self {
        self.core = QueryCore::new(id_field, modification_date_field);
        self
    }

    /// The query as configured.
    pub fn query(&self) -> &str {
        &self.query
    }

    fn effective_query(&self) -> SyncResult<String> {
        let mut mutator = QueryMutator::new(self.query.as_str());
        let missing: Vec<&str> = [self.core.id_field(), self.core.modification_date_field()]
            .into_iter()
            .filter(|field| !mutator.is_selecting_field(field))
            .collect();
        if missing.is_empty() {
            return Ok(self.query.clone());
        }
        mutator.add_select_fields(&missing.join(", "));
        mutator
            .as_builder()?
            .build()
            .ok_or_else(|| SyncError::configuration(format!("not a query: {}", self.query)))
    }

    fn ids_query(&self) -> SyncResult<String> {
        let mut mutator = QueryMutator::new(self.query.as_str());
        mutator.replace_select_fields(self.core.id_field());
        mutator
            .as_builder()?
            .build()
            .ok_or_else(|| SyncError::configuration(format!("not a query: {}", self.query)))
    }
}

impl DownloadTarget for QueryTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        let query = self
            .core
            .incremental_query(&self.effective_query()?, max_time_stamp);
        tracing::debug!(soup = ctx.soup_name, %query, "starting query fetch");
        self.core.start(ctx.remote, &query)
    }

    fn continue_fetch(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>> {
        self.core.more(ctx.remote)
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

    fn latest_modification_time_stamp(&self, records: &[Value]) -> i64 {
        self.core.latest_time_stamp(records)
    }

    fn remote_ids(&mut self, ctx: &SyncContext<'_>) -> SyncResult<HashSet<String>> {
        self.core.collect_ids(ctx.remote, &self.ids_query()?)
    }

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "soql")
    }
}
