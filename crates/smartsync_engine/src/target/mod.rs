//! Download and upload targets.
//!
//! A download target decides *what* to fetch from the remote service and
//! how to paginate it. Built-in variants form the closed [`FetchTarget`]
//! union; custom variants are resolved through the
//! [`TargetRegistry`](crate::TargetRegistry) by the identifier stored in
//! their JSON.
//!
//! Targets are rebuilt from the job's persisted JSON at the start of every
//! run, so pagination state never outlives a run.

mod parent_children;
mod push;
mod query;
mod recent;
mod refresh;
mod search;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::options::MergeMode;
use crate::record::{
    is_dirty, mark_clean, modification_time, LOCAL, LOCALLY_CREATED, LOCALLY_DELETED,
    LOCALLY_UPDATED, SOUP_ENTRY_ID,
};
use crate::registry::TargetRegistry;
use crate::remote::RemoteService;
use crate::store::{collect_all, LocalStore, StoreFilter, StoreQuery, UpsertKey};

pub use parent_children::{
    ChildrenInfo, ParentChildRelationship, ParentChildrenTarget, ParentInfo, RelationshipType,
};
pub(crate) use push::{sync_up_record, RecordOutcome};
pub use push::{CustomPushTarget, DefaultPushTarget, PushTarget, UploadTarget};
pub use query::{QueryCore, QueryTarget};
pub use recent::{RecentTarget, DEFAULT_RECENT_LIMIT};
pub use refresh::RefreshTarget;
pub use search::SearchTarget;

/// JSON key holding a target's variant tag.
pub const TYPE_KEY: &str = "type";
/// JSON key naming a custom target's registered implementation.
pub const IMPLEMENTATION_KEY: &str = "implementation";

/// Handles available to a target during a run.
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    /// Remote service.
    pub remote: &'a dyn RemoteService,
    /// Local store.
    pub store: &'a dyn LocalStore,
    /// The job's local collection.
    pub soup_name: &'a str,
    /// Engine configuration.
    pub config: &'a SyncConfig,
}

/// Behavior of a download target.
pub trait DownloadTarget: Send {
    /// Issues the first request and returns the first page.
    ///
    /// `max_time_stamp > 0` restricts the fetch to records modified after
    /// that instant (epoch milliseconds).
    fn start_fetch(&mut self, ctx: &SyncContext<'_>, max_time_stamp: i64)
        -> SyncResult<Vec<Value>>;

    /// Returns the next page, or `None` when exhausted.
    fn continue_fetch(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>>;

    /// Total number of records, known after `start_fetch`; -1 before.
    fn total_size(&self) -> i64;

    /// Server id field.
    fn id_field(&self) -> &str;

    /// Server modification date field.
    fn modification_date_field(&self) -> &str;

    /// Latest modification time in a page, -1 when none is known.
    fn latest_modification_time_stamp(&self, records: &[Value]) -> i64 {
        latest_time_stamp(records, self.modification_date_field())
    }

    /// Writes a page into the local store and returns the number of records
    /// written.
    fn save_records(
        &mut self,
        ctx: &SyncContext<'_>,
        records: Vec<Value>,
        merge_mode: MergeMode,
    ) -> SyncResult<usize> {
        save_flat_records(ctx.store, ctx.soup_name, self.id_field(), records, merge_mode)
    }

    /// Returns every server id currently matched by the target.
    fn remote_ids(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<HashSet<String>> {
        Err(SyncError::configuration(
            "ghost cleanup is not supported by this target",
        ))
    }

    /// Deletes clean local records that no longer exist remotely and
    /// returns how many were removed.
    fn clean_ghosts(&mut self, ctx: &SyncContext<'_>) -> SyncResult<usize> {
        let remote_ids = self.remote_ids(ctx)?;
        delete_ghosts(ctx, ctx.soup_name, self.id_field(), &remote_ids)
    }

    /// Runs after the last page of a successful download and returns the
    /// number of local records removed.
    fn finish_run(&mut self, _ctx: &SyncContext<'_>) -> SyncResult<usize> {
        Ok(0)
    }

    /// Serializes the target, including its `type` tag.
    fn to_json(&self) -> SyncResult<Value>;
}

/// A custom download target built by a registered factory.
pub struct CustomFetchTarget {
    implementation: String,
    inner: Box<dyn DownloadTarget>,
}

impl CustomFetchTarget {
    /// Wraps a target built for `implementation`.
    pub fn new(implementation: impl Into<String>, inner: Box<dyn DownloadTarget>) -> Self {
        Self {
            implementation: implementation.into(),
            inner,
        }
    }

    /// Registered implementation identifier.
    pub fn implementation(&self) -> &str {
        &self.implementation
    }
}

impl fmt::Debug for CustomFetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomFetchTarget")
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

/// A download target.
#[derive(Debug)]
pub enum FetchTarget {
    /// Plain query (`soql`).
    Query(QueryTarget),
    /// Full-text search (`sosl`).
    Search(SearchTarget),
    /// Most recently viewed records (`mru`).
    RecentlyUsed(RecentTarget),
    /// Re-fetch of records already in the local collection (`refresh`).
    Refresh(RefreshTarget),
    /// Parents with their children (`parent_children`).
    ParentChildren(ParentChildrenTarget),
    /// Registered custom implementation (`custom`).
    Custom(CustomFetchTarget),
}

impl FetchTarget {
    /// Variant tag as persisted in the job record.
    pub fn tag(&self) -> &'static str {
        match self {
            FetchTarget::Query(_) => "soql",
            FetchTarget::Search(_) => "sosl",
            FetchTarget::RecentlyUsed(_) => "mru",
            FetchTarget::Refresh(_) => "refresh",
            FetchTarget::ParentChildren(_) => "parent_children",
            FetchTarget::Custom(_) => "custom",
        }
    }

    /// Rebuilds a target from its persisted JSON.
    pub fn from_json(value: &Value, registry: &TargetRegistry) -> SyncResult<Self> {
        let tag = value
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::configuration("fetch target has no type"))?;
        let target = match tag {
            "soql" => FetchTarget::Query(serde_json::from_value(value.clone())?),
            "sosl" => FetchTarget::Search(serde_json::from_value(value.clone())?),
            "mru" => FetchTarget::RecentlyUsed(serde_json::from_value(value.clone())?),
            "refresh" => FetchTarget::Refresh(serde_json::from_value(value.clone())?),
            "parent_children" => {
                let target: ParentChildrenTarget = serde_json::from_value(value.clone())?;
                FetchTarget::ParentChildren(target.validated()?)
            }
            "custom" => {
                let implementation = custom_implementation(value)?;
                let inner = registry.build_fetch(implementation, value)?;
                FetchTarget::Custom(CustomFetchTarget::new(implementation, inner))
            }
            other => {
                return Err(SyncError::configuration(format!(
                    "unknown fetch target type {other:?}"
                )))
            }
        };
        Ok(target)
    }

    fn inner(&self) -> &dyn DownloadTarget {
        match self {
            FetchTarget::Query(t) => t,
            FetchTarget::Search(t) => t,
            FetchTarget::RecentlyUsed(t) => t,
            FetchTarget::Refresh(t) => t,
            FetchTarget::ParentChildren(t) => t,
            FetchTarget::Custom(t) => t.inner.as_ref(),
        }
    }

    fn inner_mut(&mut self) -> &mut dyn DownloadTarget {
        match self {
            FetchTarget::Query(t) => t,
            FetchTarget::Search(t) => t,
            FetchTarget::RecentlyUsed(t) => t,
            FetchTarget::Refresh(t) => t,
            FetchTarget::ParentChildren(t) => t,
            FetchTarget::Custom(t) => t.inner.as_mut(),
        }
    }
}

impl From<QueryTarget> for FetchTarget {
    fn from(target: QueryTarget) -> Self {
        FetchTarget::Query(target)
    }
}

impl From<SearchTarget> for FetchTarget {
    fn from(target: SearchTarget) -> Self {
        FetchTarget::Search(target)
    }
}

impl From<RecentTarget> for FetchTarget {
    fn from(target: RecentTarget) -> Self {
        FetchTarget::RecentlyUsed(target)
    }
}

impl From<RefreshTarget> for FetchTarget {
    fn from(target: RefreshTarget) -> Self {
        FetchTarget::Refresh(target)
    }
}

impl From<ParentChildrenTarget> for FetchTarget {
    fn from(target: ParentChildrenTarget) -> Self {
        FetchTarget::ParentChildren(target)
    }
}

impl From<CustomFetchTarget> for FetchTarget {
    fn from(target: CustomFetchTarget) -> Self {
        FetchTarget::Custom(target)
    }
}

impl DownloadTarget for FetchTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        self.inner_mut().start_fetch(ctx, max_time_stamp)
    }

    fn continue_fetch(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>> {
        self.inner_mut().continue_fetch(ctx)
    }

    fn total_size(&self) -> i64 {
        self.inner().total_size()
    }

    fn id_field(&self) -> &str {
        self.inner().id_field()
    }

    fn modification_date_field(&self) -> &str {
        self.inner().modification_date_field()
    }

    fn latest_modification_time_stamp(&self, records: &[Value]) -> i64 {
        self.inner().latest_modification_time_stamp(records)
    }

    fn save_records(
        &mut self,
        ctx: &SyncContext<'_>,
        records: Vec<Value>,
        merge_mode: MergeMode,
    ) -> SyncResult<usize> {
        self.inner_mut().save_records(ctx, records, merge_mode)
    }

    fn remote_ids(&mut self, ctx: &SyncContext<'_>) -> SyncResult<HashSet<String>> {
        self.inner_mut().remote_ids(ctx)
    }

    fn clean_ghosts(&mut self, ctx: &SyncContext<'_>) -> SyncResult<usize> {
        self.inner_mut().clean_ghosts(ctx)
    }

    fn finish_run(&mut self, ctx: &SyncContext<'_>) -> SyncResult<usize> {
        self.inner_mut().finish_run(ctx)
    }

    fn to_json(&self) -> SyncResult<Value> {
        match self {
            FetchTarget::Custom(custom) => {
                let mut value = custom.inner.to_json()?;
                set_key(&mut value, TYPE_KEY, Value::from("custom"))?;
                set_key(
                    &mut value,
                    IMPLEMENTATION_KEY,
                    Value::from(custom.implementation.clone()),
                )?;
                Ok(value)
            }
            other => other.inner().to_json(),
        }
    }
}

pub(crate) fn custom_implementation(value: &Value) -> SyncResult<&str> {
    value
        .get(IMPLEMENTATION_KEY)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::configuration("custom target has no implementation"))
}

fn set_key(value: &mut Value, key: &str, entry: Value) -> SyncResult<()> {
    match value {
        Value::Object(map) => {
            map.insert(key.to_string(), entry);
            Ok(())
        }
        _ => Err(SyncError::configuration("target JSON must be an object")),
    }
}

/// Serializes a built-in target and adds its tag.
pub(crate) fn tagged<T: Serialize>(target: &T, tag: &str) -> SyncResult<Value> {
    let mut value = serde_json::to_value(target)?;
    set_key(&mut value, TYPE_KEY, Value::from(tag))?;
    Ok(value)
}

/// Filter matching records with any pending local change.
pub(crate) fn dirty_filter() -> StoreFilter {
    StoreFilter::Any(
        [LOCAL, LOCALLY_CREATED, LOCALLY_UPDATED, LOCALLY_DELETED]
            .into_iter()
            .map(|flag| StoreFilter::IsTrue(flag.to_string()))
            .collect(),
    )
}

/// Projection with the surrogate key, `id_field` and the local flags.
pub(crate) fn flag_projection(id_field: &str) -> Vec<String> {
    [
        SOUP_ENTRY_ID,
        id_field,
        LOCAL,
        LOCALLY_CREATED,
        LOCALLY_UPDATED,
        LOCALLY_DELETED,
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub(crate) fn latest_time_stamp(records: &[Value], field: &str) -> i64 {
    records
        .iter()
        .filter_map(|r| modification_time(r, field))
        .max()
        .unwrap_or(-1)
}

/// Appends `required` fields missing from `fields`, compared case-insensitively.
pub(crate) fn with_required_fields(fields: &[String], required: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(fields.len() + required.len());
    for field in fields.iter().map(String::as_str).chain(required.iter().copied()) {
        let field = field.trim();
        if !field.is_empty() && !out.iter().any(|f| f.eq_ignore_ascii_case(field)) {
            out.push(field.to_string());
        }
    }
    out
}

/// `field IN ('a', 'b')`, with quotes in ids escaped.
pub(crate) fn id_in_predicate(field: &str, ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\\', "\\\\").replace('\'', "\\'")))
        .collect();
    format!("{field} IN ({})", quoted.join(", "))
}

pub(crate) fn string_ids<'a>(records: impl IntoIterator<Item = &'a Value>, field: &str) -> Vec<String> {
    records
        .into_iter()
        .filter_map(|r| r.get(field).and_then(Value::as_str))
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Server ids among `ids` whose local copy in `soup` is dirty.
pub(crate) fn dirty_server_ids(
    store: &dyn LocalStore,
    soup: &str,
    id_field: &str,
    ids: Vec<Value>,
) -> SyncResult<HashSet<String>> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }
    let query = StoreQuery::all(soup, ids.len())
        .filter(StoreFilter::And(vec![
            StoreFilter::In(id_field.to_string(), ids),
            dirty_filter(),
        ]))
        .project([id_field]);
    let rows = collect_all(store, &query)?;
    Ok(string_ids(&rows, id_field).into_iter().collect())
}

/// Upserts downloaded records keyed by `id_field` with local flags cleared.
///
/// Under [`MergeMode::LeaveIfChanged`] records whose local copy is dirty
/// are skipped.
pub(crate) fn save_flat_records(
    store: &dyn LocalStore,
    soup: &str,
    id_field: &str,
    mut records: Vec<Value>,
    merge_mode: MergeMode,
) -> SyncResult<usize> {
    if merge_mode == MergeMode::LeaveIfChanged {
        let ids = records
            .iter()
            .filter_map(|r| r.get(id_field))
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        let dirty = dirty_server_ids(store, soup, id_field, ids)?;
        if !dirty.is_empty() {
            tracing::debug!(soup, skipped = dirty.len(), "leaving locally modified records");
            records.retain(|r| {
                r.get(id_field)
                    .and_then(Value::as_str)
                    .map_or(true, |id| !dirty.contains(id))
            });
        }
    }
    for record in &mut records {
        if let Value::Object(map) = record {
            mark_clean(map);
        }
    }
    let count = records.len();
    if count > 0 {
        store.upsert(soup, records, UpsertKey::Field(id_field))?;
    }
    Ok(count)
}

/// Deletes clean local records of `soup` whose server id is not in
/// `remote_ids`. Locally created records have no server id and are kept.
pub(crate) fn delete_ghosts(
    ctx: &SyncContext<'_>,
    soup: &str,
    id_field: &str,
    remote_ids: &HashSet<String>,
) -> SyncResult<usize> {
    let query = StoreQuery::all(soup, ctx.config.store_page_size)
        .filter(StoreFilter::NotNull(id_field.to_string()))
        .project(flag_projection(id_field));
    let ghosts: Vec<i64> = collect_all(ctx.store, &query)?
        .iter()
        .filter(|row| !is_dirty(row))
        .filter(|row| {
            row.get(id_field)
                .and_then(Value::as_str)
                .is_some_and(|id| !remote_ids.contains(id))
        })
        .filter_map(|row| row.get(SOUP_ENTRY_ID).and_then(Value::as_i64))
        .collect();
    if !ghosts.is_empty() {
        ctx.store.delete(soup, &ghosts)?;
        tracing::info!(soup, records = ghosts.len(), "removed ghost records");
    }
    Ok(ghosts.len())
}
