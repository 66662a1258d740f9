//! Upload targets and the per-record upload step.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smartsync_query::QueryBuilder;

use super::{
    custom_implementation, dirty_filter, set_key, tagged, SyncContext, IMPLEMENTATION_KEY, TYPE_KEY,
};
use crate::error::{SyncError, SyncResult};
use crate::options::{MergeMode, SyncOptions};
use crate::record::{
    is_bookkeeping_field, is_locally_created, is_locally_deleted, mark_clean, modification_time,
    object_type, soup_entry_id, string_field, DEFAULT_ID_FIELD, DEFAULT_MODIFICATION_DATE_FIELD,
    LAST_ERROR, SOUP_ENTRY_ID,
};
use crate::registry::TargetRegistry;
use crate::remote::{RemoteResponse, RemoteService};
use crate::store::{collect_all, LocalStore, StoreQuery, UpsertKey};

/// Behavior of an upload target.
///
/// Every method has a default, so a custom target only overrides the steps
/// it changes.
pub trait UploadTarget: Send {
    /// Server id field.
    fn id_field(&self) -> &str {
        DEFAULT_ID_FIELD
    }

    /// Server modification date field.
    fn modification_date_field(&self) -> &str {
        DEFAULT_MODIFICATION_DATE_FIELD
    }

    /// Fields sent on create, overriding the job's field list.
    fn create_field_list(&self) -> Option<&[String]> {
        None
    }

    /// Fields sent on update, overriding the job's field list.
    fn update_field_list(&self) -> Option<&[String]> {
        None
    }

    /// Local keys of the records of `soup` with pending changes.
    fn ids_of_records_to_sync_up(
        &self,
        store: &dyn LocalStore,
        soup: &str,
        page_size: usize,
    ) -> SyncResult<Vec<i64>> {
        let query = StoreQuery::all(soup, page_size)
            .filter(dirty_filter())
            .project([SOUP_ENTRY_ID]);
        Ok(collect_all(store, &query)?.iter().filter_map(soup_entry_id).collect())
    }

    /// Creates a record on the server.
    fn create_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        remote.create(object_type, fields)
    }

    /// Updates a record on the server.
    fn update_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        remote.update(object_type, id, fields)
    }

    /// Deletes a record on the server.
    fn delete_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
    ) -> SyncResult<RemoteResponse> {
        remote.delete(object_type, id)
    }

    /// Current server modification time of a record, `None` when the
    /// record or its date is missing.
    fn fetch_last_modified_date(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
    ) -> SyncResult<Option<i64>> {
        let date_field = self.modification_date_field();
        let query = QueryBuilder::with_fields([date_field])
            .from(object_type)
            .where_clause(format!(
                "{} = '{}'",
                self.id_field(),
                id.replace('\\', "\\\\").replace('\'', "\\'")
            ))
            .build()
            .ok_or_else(|| SyncError::configuration("record has no object type"))?;
        let response = remote.query(&query)?;
        Ok(response
            .records
            .first()
            .and_then(|record| modification_time(record, date_field)))
    }

    /// Serializes the target, including its `type` tag.
    fn to_json(&self) -> SyncResult<Value>;
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

fn default_modification_date_field() -> String {
    DEFAULT_MODIFICATION_DATE_FIELD.to_string()
}

/// Uploads through the standard create, update and delete calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPushTarget {
    #[serde(rename = "createFieldlist", default, skip_serializing_if = "Option::is_none")]
    create_field_list: Option<Vec<String>>,
    #[serde(rename = "updateFieldlist", default, skip_serializing_if = "Option::is_none")]
    update_field_list: Option<Vec<String>>,
    #[serde(rename = "idFieldName", default = "default_id_field")]
    id_field: String,
    #[serde(
        rename = "modificationDateFieldName",
        default = "default_modification_date_field"
    )]
    modification_date_field: String,
}

impl Default for DefaultPushTarget {
    fn default() -> Self {
        Self {
            create_field_list: None,
            update_field_list: None,
            id_field: default_id_field(),
            modification_date_field: default_modification_date_field(),
        }
    }
}

impl DefaultPushTarget {
    /// Creates a target sending the job's field list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the fields sent on create.
    pub fn with_create_field_list<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_field_list = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts the fields sent on update.
    pub fn with_update_field_list<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update_field_list = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the id and modification date field names.
    pub fn with_fields(
        mut self,
        id_field: impl Into<String>,
        modification_date_field: impl Into<String>,
    ) -> Self {
        self.id_field = id_field.into();
        self.modification_date_field = modification_date_field.into();
        self
    }
}

impl UploadTarget for DefaultPushTarget {
    fn id_field(&self) -> &str {
        &self.id_field
    }

    fn modification_date_field(&self) -> &str {
        &self.modification_date_field
    }

    fn create_field_list(&self) -> Option<&[String]> {
        self.create_field_list.as_deref()
    }

    fn update_field_list(&self) -> Option<&[String]> {
        self.update_field_list.as_deref()
    }

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "default")
    }
}

/// A custom upload target built by a registered factory.
pub struct CustomPushTarget {
    implementation: String,
    inner: Box<dyn UploadTarget>,
}

impl CustomPushTarget {
    /// Wraps a target built for `implementation`.
    pub fn new(implementation: impl Into<String>, inner: Box<dyn UploadTarget>) -> Self {
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

impl fmt::Debug for CustomPushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPushTarget")
            .field("implementation", &self.implementation)
            .finish_non_exhaustive()
    }
}

/// An upload target.
#[derive(Debug)]
pub enum PushTarget {
    /// Standard create, update and delete calls (`default`).
    Default(DefaultPushTarget),
    /// Registered custom implementation (`custom`).
    Custom(CustomPushTarget),
}

impl Default for PushTarget {
    fn default() -> Self {
        PushTarget::Default(DefaultPushTarget::default())
    }
}

impl PushTarget {
    /// Variant tag as persisted in the job record.
    pub fn tag(&self) -> &'static str {
        match self {
            PushTarget::Default(_) => "default",
            PushTarget::Custom(_) => "custom",
        }
    }

    /// Rebuilds a target from its persisted JSON. A missing tag means
    /// `default`.
    pub fn from_json(value: &Value, registry: &TargetRegistry) -> SyncResult<Self> {
        match value.get(TYPE_KEY).and_then(Value::as_str).unwrap_or("default") {
            "default" => Ok(PushTarget::Default(serde_json::from_value(value.clone())?)),
            "custom" => {
                let implementation = custom_implementation(value)?;
                let inner = registry.build_push(implementation, value)?;
                Ok(PushTarget::Custom(CustomPushTarget::new(implementation, inner)))
            }
            other => Err(SyncError::configuration(format!(
                "unknown push target type {other:?}"
            ))),
        }
    }

    fn inner(&self) -> &dyn UploadTarget {
        match self {
            PushTarget::Default(t) => t,
            PushTarget::Custom(t) => t.inner.as_ref(),
        }
    }
}

impl From<DefaultPushTarget> for PushTarget {
    fn from(target: DefaultPushTarget) -> Self {
        PushTarget::Default(target)
    }
}

impl From<CustomPushTarget> for PushTarget {
    fn from(target: CustomPushTarget) -> Self {
        PushTarget::Custom(target)
    }
}

impl UploadTarget for PushTarget {
    fn id_field(&self) -> &str {
        self.inner().id_field()
    }

    fn modification_date_field(&self) -> &str {
        self.inner().modification_date_field()
    }

    fn create_field_list(&self) -> Option<&[String]> {
        self.inner().create_field_list()
    }

    fn update_field_list(&self) -> Option<&[String]> {
        self.inner().update_field_list()
    }

    fn ids_of_records_to_sync_up(
        &self,
        store: &dyn LocalStore,
        soup: &str,
        page_size: usize,
    ) -> SyncResult<Vec<i64>> {
        self.inner().ids_of_records_to_sync_up(store, soup, page_size)
    }

    fn create_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        self.inner().create_on_server(remote, object_type, fields)
    }

    fn update_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        self.inner().update_on_server(remote, object_type, id, fields)
    }

    fn delete_on_server(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
    ) -> SyncResult<RemoteResponse> {
        self.inner().delete_on_server(remote, object_type, id)
    }

    fn fetch_last_modified_date(
        &self,
        remote: &dyn RemoteService,
        object_type: &str,
        id: &str,
    ) -> SyncResult<Option<i64>> {
        self.inner().fetch_last_modified_date(remote, object_type, id)
    }

    fn to_json(&self) -> SyncResult<Value> {
        match self {
            PushTarget::Custom(custom) => {
                let mut value = custom.inner.to_json()?;
                set_key(&mut value, TYPE_KEY, Value::from("custom"))?;
                set_key(
                    &mut value,
                    IMPLEMENTATION_KEY,
                    Value::from(custom.implementation.clone()),
                )?;
                Ok(value)
            }
            PushTarget::Default(target) => target.to_json(),
        }
    }
}

/// What happened to one dirty record during an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RecordOutcome {
    Created,
    Updated,
    Deleted,
    /// Left alone because the server copy changed since the last download.
    Conflict,
    /// Rejected by the server; the message was stored on the record.
    Rejected(String),
}

/// Uploads one dirty record and reconciles its local copy.
///
/// Server rejections are recorded on the record and reported as
/// [`RecordOutcome::Rejected`]; only transport and store failures are
/// returned as errors.
pub(crate) fn sync_up_record(
    target: &dyn UploadTarget,
    ctx: &SyncContext<'_>,
    options: &SyncOptions,
    record: Value,
) -> SyncResult<RecordOutcome> {
    let Some(entry_id) = soup_entry_id(&record) else {
        return Err(SyncError::Protocol(format!(
            "record in {} has no {SOUP_ENTRY_ID}",
            ctx.soup_name
        )));
    };
    let server_id = string_field(&record, target.id_field()).map(str::to_string);
    let created = is_locally_created(&record);

    if is_locally_deleted(&record) && (created || server_id.is_none()) {
        ctx.store.delete(ctx.soup_name, &[entry_id])?;
        return Ok(RecordOutcome::Deleted);
    }
    let Some(object_type) = object_type(&record).map(str::to_string) else {
        return reject(ctx, record, "record has no attributes.type".to_string());
    };
    let leave_if_changed = options.merge_mode == MergeMode::LeaveIfChanged;

    match server_id {
        Some(id) if is_locally_deleted(&record) => {
            if leave_if_changed && is_newer_on_server(target, ctx, &object_type, &id, &record)? {
                return Ok(RecordOutcome::Conflict);
            }
            let response = target.delete_on_server(ctx.remote, &object_type, &id)?;
            if response.is_success() || response.is_not_found() {
                ctx.store.delete(ctx.soup_name, &[entry_id])?;
                Ok(RecordOutcome::Deleted)
            } else {
                reject(ctx, record, response.error_message())
            }
        }
        Some(id) if !created => {
            if leave_if_changed && is_newer_on_server(target, ctx, &object_type, &id, &record)? {
                return Ok(RecordOutcome::Conflict);
            }
            let fields = payload(target, &record, target.update_field_list(), options);
            let response = target.update_on_server(ctx.remote, &object_type, &id, &fields)?;
            if response.is_success() {
                save_clean(ctx, record)?;
                Ok(RecordOutcome::Updated)
            } else if response.is_not_found() && !leave_if_changed {
                tracing::debug!(%id, "record gone on server, creating it again");
                create(target, ctx, options, &object_type, record)
            } else {
                reject(ctx, record, response.error_message())
            }
        }
        _ => create(target, ctx, options, &object_type, record),
    }
}

fn create(
    target: &dyn UploadTarget,
    ctx: &SyncContext<'_>,
    options: &SyncOptions,
    object_type: &str,
    mut record: Value,
) -> SyncResult<RecordOutcome> {
    let fields = payload(target, &record, target.create_field_list(), options);
    let response = target.create_on_server(ctx.remote, object_type, &fields)?;
    if !response.is_success() {
        return reject(ctx, record, response.error_message());
    }
    let Some(new_id) = response.created_id() else {
        return reject(ctx, record, "server did not return the new record id".to_string());
    };
    if let Value::Object(map) = &mut record {
        map.insert(target.id_field().to_string(), Value::from(new_id));
    }
    save_clean(ctx, record)?;
    Ok(RecordOutcome::Created)
}

fn save_clean(ctx: &SyncContext<'_>, mut record: Value) -> SyncResult<()> {
    if let Value::Object(map) = &mut record {
        mark_clean(map);
    }
    ctx.store.upsert(ctx.soup_name, vec![record], UpsertKey::EntryId)?;
    Ok(())
}

fn reject(ctx: &SyncContext<'_>, mut record: Value, message: String) -> SyncResult<RecordOutcome> {
    tracing::warn!(soup = ctx.soup_name, error = %message, "record rejected by server");
    if let Value::Object(map) = &mut record {
        map.insert(LAST_ERROR.to_string(), Value::from(message.clone()));
    }
    ctx.store.upsert(ctx.soup_name, vec![record], UpsertKey::EntryId)?;
    Ok(RecordOutcome::Rejected(message))
}

fn is_newer_on_server(
    target: &dyn UploadTarget,
    ctx: &SyncContext<'_>,
    object_type: &str,
    id: &str,
    record: &Value,
) -> SyncResult<bool> {
    let server = target.fetch_last_modified_date(ctx.remote, object_type, id)?;
    let local = modification_time(record, target.modification_date_field());
    Ok(matches!((server, local), (Some(server), Some(local)) if server > local))
}

/// Fields sent to the server: the target's list, else the job's, else every
/// data field. Bookkeeping, id and modification date are never sent.
fn payload(
    target: &dyn UploadTarget,
    record: &Value,
    target_fields: Option<&[String]>,
    options: &SyncOptions,
) -> Map<String, Value> {
    let Some(map) = record.as_object() else {
        return Map::new();
    };
    let sendable = |field: &str| {
        !is_bookkeeping_field(field)
            && field != target.id_field()
            && field != target.modification_date_field()
    };
    let fields = target_fields.unwrap_or(&options.field_list);
    if fields.is_empty() {
        map.iter()
            .filter(|(field, _)| sendable(field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    } else {
        fields
            .iter()
            .filter(|field| sendable(field.as_str()))
            .filter_map(|field| map.get(field).map(|value| (field.clone(), value.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::remote::{MockRemote, MockRequest, QueryResponse};
    use crate::store::MemoryStore;
    use crate::target::tests::context;
    use serde_json::json;

    fn store_with(records: Vec<Value>) -> (MemoryStore, Vec<Value>) {
        let store = MemoryStore::new();
        store.create_collection("accounts").unwrap();
        let saved = store.upsert("accounts", records, UpsertKey::EntryId).unwrap();
        (store, saved)
    }

    fn account(extra: Value) -> Value {
        let mut record = json!({"attributes": {"type": "Account"}, "Name": "Acme"});
        if let (Value::Object(map), Value::Object(extra)) = (&mut record, extra) {
            map.extend(extra);
        }
        record
    }

    #[test]
    fn creates_locally_created_record() {
        let (store, saved) = store_with(vec![account(
            json!({"__local__": true, "__locally_created__": true}),
        )]);
        let remote = MockRemote::new();
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Created);

        let record = &store.records("accounts")[0];
        assert_eq!(record["Id"], "MOCK00000001");
        assert!(!crate::record::is_dirty(record));
        match &remote.requests()[0] {
            MockRequest::Create { object_type, fields } => {
                assert_eq!(object_type, "Account");
                assert_eq!(fields.len(), 1);
                assert_eq!(fields["Name"], "Acme");
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn locally_created_then_deleted_never_reaches_server() {
        let (store, saved) = store_with(vec![account(json!({
            "__local__": true, "__locally_created__": true, "__locally_deleted__": true
        }))]);
        let remote = MockRemote::new();
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Deleted);
        assert!(store.records("accounts").is_empty());
        assert!(remote.requests().is_empty());
    }

    #[test]
    fn update_uses_target_field_list() {
        let (store, saved) = store_with(vec![account(json!({
            "Id": "001", "Phone": "555", "__local__": true, "__locally_updated__": true
        }))]);
        let remote = MockRemote::new();
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");
        let target = DefaultPushTarget::new().with_update_field_list(["Phone", "Id"]);
        let options = SyncOptions::default().with_field_list(["Name"]);

        let outcome = sync_up_record(&target, &ctx, &options, saved[0].clone()).unwrap();
        assert_eq!(outcome, RecordOutcome::Updated);
        match &remote.requests()[0] {
            MockRequest::Update { id, fields, .. } => {
                assert_eq!(id, "001");
                assert_eq!(fields, json!({"Phone": "555"}).as_object().unwrap());
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn rejection_is_recorded_and_flags_kept() {
        let (store, saved) = store_with(vec![account(json!({
            "Id": "001", "__local__": true, "__locally_updated__": true
        }))]);
        let remote = MockRemote::new();
        remote.push_write(RemoteResponse::new(
            400,
            json!([{"message": "Name is too long", "errorCode": "STRING_TOO_LONG"}]),
        ));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Rejected("Name is too long".into()));

        let record = &store.records("accounts")[0];
        assert_eq!(record[LAST_ERROR], "Name is too long");
        assert_eq!(record["__locally_updated__"], true);
    }

    #[test]
    fn missing_on_server_is_recreated_under_overwrite() {
        let (store, saved) = store_with(vec![account(json!({
            "Id": "001", "__local__": true, "__locally_updated__": true
        }))]);
        let remote = MockRemote::new();
        remote.push_write(RemoteResponse::new(404, json!([{"message": "not found"}])));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Created);
        assert_eq!(store.records("accounts")[0]["Id"], "MOCK00000001");
    }

    #[test]
    fn newer_server_copy_is_a_conflict() {
        let (store, saved) = store_with(vec![account(json!({
            "Id": "001",
            "LastModifiedDate": "2023-11-14T22:13:20.000+0000",
            "__local__": true,
            "__locally_updated__": true
        }))]);
        let remote = MockRemote::new();
        remote.push_query(QueryResponse::single(vec![
            json!({"LastModifiedDate": "2023-11-15T08:00:00.000+0000"}),
        ]));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::new(MergeMode::LeaveIfChanged),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Conflict);
        assert_eq!(
            remote.queries(),
            vec!["select LastModifiedDate from Account where Id = '001'"]
        );
        assert_eq!(remote.requests().len(), 1);
        assert_eq!(store.records("accounts")[0]["__locally_updated__"], true);
    }

    #[test]
    fn delete_tolerates_missing_server_record() {
        let (store, saved) = store_with(vec![account(json!({
            "Id": "001", "__local__": true, "__locally_deleted__": true
        }))]);
        let remote = MockRemote::new();
        remote.push_write(RemoteResponse::new(404, Value::Null));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let outcome = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap();
        assert_eq!(outcome, RecordOutcome::Deleted);
        assert!(store.records("accounts").is_empty());
    }

    #[test]
    fn transport_error_propagates() {
        let (store, saved) = store_with(vec![account(json!({
            "__local__": true, "__locally_created__": true
        }))]);
        let remote = MockRemote::new();
        remote.push_write_error("connection reset");
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let err = sync_up_record(
            &DefaultPushTarget::new(),
            &ctx,
            &SyncOptions::default(),
            saved[0].clone(),
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.records("accounts")[0]["__locally_created__"], true);
    }

    #[test]
    fn dirty_ids_skip_clean_records() {
        let (store, _) = store_with(vec![
            json!({"Id": "1", "__local__": false}),
            json!({"Id": "2", "__local__": true, "__locally_updated__": true}),
            json!({"Name": "x", "__locally_created__": true}),
        ]);
        let ids = DefaultPushTarget::new()
            .ids_of_records_to_sync_up(&store, "accounts", 10)
            .unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn json_shape_and_default_tag() {
        let registry = TargetRegistry::new();
        let target = PushTarget::from(DefaultPushTarget::new().with_create_field_list(["Name"]));
        let value = target.to_json().unwrap();
        assert_eq!(value["type"], "default");
        assert_eq!(value["createFieldlist"], json!(["Name"]));
        assert!(value.get("updateFieldlist").is_none());

        let untagged = PushTarget::from_json(&json!({}), &registry).unwrap();
        assert_eq!(untagged.tag(), "default");
        assert!(PushTarget::from_json(&json!({"type": "bulk"}), &registry)
            .unwrap_err()
            .is_configuration());
    }
}
