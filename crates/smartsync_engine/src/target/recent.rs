//! Most recently viewed records target.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_query::QueryBuilder;

use super::{id_in_predicate, tagged, with_required_fields, DownloadTarget, QueryCore, SyncContext};
use crate::error::{SyncError, SyncResult};

/// Default number of recently viewed ids requested.
pub const DEFAULT_RECENT_LIMIT: usize = 200;

fn default_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

/// Downloads the records of an object type the user viewed most recently.
///
/// Two steps: the recently viewed ids, then one query for those ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentTarget {
    #[serde(rename = "sobjectType")]
    object_type: String,
    #[serde(rename = "fieldlist", default)]
    field_list: Vec<String>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(flatten)]
    core: QueryCore,
}

impl RecentTarget {
    /// Creates a target for an object type and the fields to download.
    pub fn new<I, S>(object_type: impl Into<String>, field_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object_type: object_type.into(),
            field_list: field_list.into_iter().map(Into::into).collect(),
            limit: DEFAULT_RECENT_LIMIT,
            core: QueryCore::default(),
        }
    }

    /// Sets how many recently viewed ids are requested.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Object type.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    fn ids_query(&self, fields: &[String], ids: &[String]) -> SyncResult<String> {
        QueryBuilder::with_fields(fields)
            .from(self.object_type.as_str())
            .where_clause(id_in_predicate(self.core.id_field(), ids))
            .build()
            .ok_or_else(|| SyncError::configuration("most recently used target has no object type"))
    }
}

impl DownloadTarget for RecentTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        self.core.clear_cursor();
        let ids = ctx.remote.recently_viewed(&self.object_type, self.limit)?;
        if ids.is_empty() {
            self.core.set_total_size(0);
            return Ok(Vec::new());
        }
        let fields = with_required_fields(
            &self.field_list,
            &[self.core.id_field(), self.core.modification_date_field()],
        );
        let query = self
            .core
            .incremental_query(&self.ids_query(&fields, &ids)?, max_time_stamp);
        let records = self.core.start(ctx.remote, &query)?;
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
        let ids = ctx.remote.recently_viewed(&self.object_type, self.limit)?;
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let query = self.ids_query(&[self.core.id_field().to_string()], &ids)?;
        self.core.collect_ids(ctx.remote, &query)
    }

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "mru")
    }
}
