//! Refresh of records already cached locally.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_query::QueryBuilder;

use super::{
    id_in_predicate, string_ids, tagged, with_required_fields, DownloadTarget, QueryCore,
    SyncContext,
};
use crate::error::{SyncError, SyncResult};
use crate::record::LOCALLY_CREATED;
use crate::store::{StoreFilter, StoreQuery};

/// Re-downloads the records of a local collection that have a server id,
/// one `Id IN (...)` query per batch of local ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTarget {
    #[serde(rename = "sobjectType")]
    object_type: String,
    #[serde(rename = "fieldlist", default)]
    field_list: Vec<String>,
    #[serde(rename = "soupName", default, skip_serializing_if = "Option::is_none")]
    soup_name: Option<String>,
    #[serde(
        rename = "countIdsPerSoql",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    batch_size: Option<usize>,
    #[serde(flatten)]
    core: QueryCore,
    #[serde(skip)]
    page: usize,
    #[serde(skip)]
    max_time_stamp: i64,
}

impl RefreshTarget {
    /// Creates a target refreshing `object_type` records of the job's
    /// collection.
    pub fn new<I, S>(object_type: impl Into<String>, field_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            object_type: object_type.into(),
            field_list: field_list.into_iter().map(Into::into).collect(),
            soup_name: None,
            batch_size: None,
            core: QueryCore::default(),
            page: 0,
            max_time_stamp: 0,
        }
    }

    /// Reads ids from another collection than the job's.
    pub fn with_soup_name(mut self, soup_name: impl Into<String>) -> Self {
        self.soup_name = Some(soup_name.into());
        self
    }

    /// Sets the number of ids per remote query.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size.max(1));
        self
    }

    fn batch_size(&self, ctx: &SyncContext<'_>) -> usize {
        self.batch_size
            .unwrap_or(ctx.config.refresh_batch_size)
            .max(1)
    }

    fn local_ids_query(&self, ctx: &SyncContext<'_>) -> StoreQuery {
        let soup = self.soup_name.as_deref().unwrap_or(ctx.soup_name);
        StoreQuery::all(soup, self.batch_size(ctx))
            .filter(StoreFilter::And(vec![
                StoreFilter::NotNull(self.core.id_field().to_string()),
                StoreFilter::Not(Box::new(StoreFilter::IsTrue(LOCALLY_CREATED.to_string()))),
            ]))
            .project([self.core.id_field()])
    }

    fn fetch_page(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Vec<Value>> {
        let rows = ctx.store.query_page(&self.local_ids_query(ctx), self.page)?;
        let ids = string_ids(&rows, self.core.id_field());
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let fields = with_required_fields(
            &self.field_list,
            &[self.core.id_field(), self.core.modification_date_field()],
        );
        let query = QueryBuilder::with_fields(&fields)
            .from(self.object_type.as_str())
            .where_clause(id_in_predicate(self.core.id_field(), &ids))
            .build()
            .ok_or_else(|| SyncError::configuration("refresh target has no object type"))?;
        let query = self.core.incremental_query(&query, self.max_time_stamp);
        tracing::debug!(page = self.page, ids = ids.len(), "refreshing batch");
        self.core.fetch_all(ctx.remote, &query)
    }
}

impl DownloadTarget for RefreshTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        self.page = 0;
        self.max_time_stamp = max_time_stamp;
        let total = ctx.store.count(&self.local_ids_query(ctx))?;
        self.core.set_total_size(total as i64);
        self.fetch_page(ctx)
    }

    fn continue_fetch(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>> {
        let total = usize::try_from(self.core.total_size()).unwrap_or(0);
        let next = self.page + 1;
        if next.saturating_mul(self.batch_size(ctx)) >= total {
            return Ok(None);
        }
        self.page = next;
        self.fetch_page(ctx).map(Some)
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

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "refresh")
    }
}
