//! Parents downloaded together with their children.
//!
//! One query selects the parents with a nested sub-select over the
//! children's relationship. Parents land in the job's collection; children
//! are flattened into their own collection with references to the parent's
//! server id and local id.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smartsync_query::{format_timestamp, QueryBuilder};

use super::{
    dirty_filter, flag_projection, latest_time_stamp, string_ids, tagged, with_required_fields,
    DownloadTarget, SyncContext, QueryCore,
};
use crate::error::{SyncError, SyncResult};
use crate::options::MergeMode;
use crate::record::{
    is_dirty, mark_clean, soup_entry_id, DEFAULT_ID_FIELD, DEFAULT_MODIFICATION_DATE_FIELD,
    SOUP_ENTRY_ID,
};
use crate::store::{collect_all, StoreFilter, StoreQuery, UpsertKey};

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

fn default_modification_date_field() -> String {
    DEFAULT_MODIFICATION_DATE_FIELD.to_string()
}

/// Cardinality between parent and children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    /// Children cannot exist without their parent.
    MasterDetail,
    /// Children only reference their parent.
    Lookup,
}

/// The parent side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentInfo {
    #[serde(rename = "sobjectType")]
    object_type: String,
    #[serde(rename = "idFieldName", default = "default_id_field")]
    id_field: String,
    #[serde(
        rename = "modificationDateFieldName",
        default = "default_modification_date_field"
    )]
    modification_date_field: String,
}

impl ParentInfo {
    /// Parent of the given object type with default field names.
    pub fn new(object_type: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id_field: default_id_field(),
            modification_date_field: default_modification_date_field(),
        }
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

    /// Object type.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Id field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Modification date field.
    pub fn modification_date_field(&self) -> &str {
        &self.modification_date_field
    }
}

/// The children side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildrenInfo {
    #[serde(rename = "sobjectType")]
    object_type: String,
    #[serde(rename = "sobjectTypePlural")]
    object_type_plural: String,
    #[serde(rename = "soupName")]
    soup_name: String,
    #[serde(rename = "parentIdFieldName")]
    parent_id_field: String,
    #[serde(rename = "parentLocalIdFieldName")]
    parent_local_id_field: String,
    #[serde(rename = "idFieldName", default = "default_id_field")]
    id_field: String,
    #[serde(
        rename = "modificationDateFieldName",
        default = "default_modification_date_field"
    )]
    modification_date_field: String,
}

impl ChildrenInfo {
    /// Children descriptor with default id and modification date fields.
    ///
    /// `object_type_plural` is the relationship name used in the nested
    /// select; `parent_id_field` and `parent_local_id_field` are the child
    /// fields receiving the parent's server id and local id.
    pub fn new(
        object_type: impl Into<String>,
        object_type_plural: impl Into<String>,
        soup_name: impl Into<String>,
        parent_id_field: impl Into<String>,
        parent_local_id_field: impl Into<String>,
    ) -> Self {
        Self {
            object_type: object_type.into(),
            object_type_plural: object_type_plural.into(),
            soup_name: soup_name.into(),
            parent_id_field: parent_id_field.into(),
            parent_local_id_field: parent_local_id_field.into(),
            id_field: default_id_field(),
            modification_date_field: default_modification_date_field(),
        }
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

    /// Object type.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Relationship name.
    pub fn object_type_plural(&self) -> &str {
        &self.object_type_plural
    }

    /// Local collection of the children.
    pub fn soup_name(&self) -> &str {
        &self.soup_name
    }

    /// Child field holding the parent's server id.
    pub fn parent_id_field(&self) -> &str {
        &self.parent_id_field
    }

    /// Child field holding the parent's local id.
    pub fn parent_local_id_field(&self) -> &str {
        &self.parent_local_id_field
    }

    /// Id field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Modification date field.
    pub fn modification_date_field(&self) -> &str {
        &self.modification_date_field
    }
}

/// Parent and children descriptors plus cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChildRelationship {
    parent: ParentInfo,
    children: ChildrenInfo,
    #[serde(rename = "relationshipType")]
    relationship_type: RelationshipType,
}

impl ParentChildRelationship {
    /// Creates a relationship, rejecting blank names and references.
    pub fn new(
        parent: ParentInfo,
        children: ChildrenInfo,
        relationship_type: RelationshipType,
    ) -> SyncResult<Self> {
        let relationship = Self {
            parent,
            children,
            relationship_type,
        };
        relationship.validate()?;
        Ok(relationship)
    }

    fn validate(&self) -> SyncResult<()> {
        let required = [
            ("parent object type", self.parent.object_type.as_str()),
            ("parent id field", self.parent.id_field.as_str()),
            ("parent modification date field", self.parent.modification_date_field.as_str()),
            ("children object type", self.children.object_type.as_str()),
            ("children relationship name", self.children.object_type_plural.as_str()),
            ("children collection", self.children.soup_name.as_str()),
            ("children parent id field", self.children.parent_id_field.as_str()),
            ("children parent local id field", self.children.parent_local_id_field.as_str()),
            ("children id field", self.children.id_field.as_str()),
            ("children modification date field", self.children.modification_date_field.as_str()),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(SyncError::configuration(format!(
                "parent/children relationship: {name} must not be empty"
            ))),
            None => Ok(()),
        }
    }

    /// Parent descriptor.
    pub fn parent(&self) -> &ParentInfo {
        &self.parent
    }

    /// Children descriptor.
    pub fn children(&self) -> &ChildrenInfo {
        &self.children
    }

    /// Cardinality.
    pub fn relationship_type(&self) -> RelationshipType {
        self.relationship_type
    }
}

/// Downloads parents with their children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentChildrenTarget {
    #[serde(flatten)]
    relationship: ParentChildRelationship,
    #[serde(rename = "parentFieldlist", default)]
    parent_field_list: Vec<String>,
    #[serde(rename = "parentSoqlFilter", default, skip_serializing_if = "String::is_empty")]
    parent_filter: String,
    #[serde(rename = "childrenFieldlist", default)]
    children_field_list: Vec<String>,
    #[serde(skip)]
    core: QueryCore,
}

impl ParentChildrenTarget {
    /// Creates a target.
    ///
    /// `parent_filter` is a where predicate on the parents; empty means all.
    pub fn new<P, C>(
        relationship: ParentChildRelationship,
        parent_field_list: P,
        parent_filter: impl Into<String>,
        children_field_list: C,
    ) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut core = QueryCore::default();
        core.set_fields(
            relationship.parent.id_field(),
            relationship.parent.modification_date_field(),
        );
        Self {
            relationship,
            parent_field_list: parent_field_list.into_iter().map(Into::into).collect(),
            parent_filter: parent_filter.into(),
            children_field_list: children_field_list.into_iter().map(Into::into).collect(),
            core,
        }
    }

    /// Validates a deserialized target and syncs its field names.
    pub(crate) fn validated(mut self) -> SyncResult<Self> {
        self.relationship.validate()?;
        let parent = &self.relationship.parent;
        self.core
            .set_fields(parent.id_field(), parent.modification_date_field());
        Ok(self)
    }

    /// The relationship.
    pub fn relationship(&self) -> &ParentChildRelationship {
        &self.relationship
    }

    fn nested_select(&self, fields: &[String]) -> String {
        format!(
            "(select {} from {})",
            fields.join(", "),
            self.relationship.children.object_type_plural
        )
    }

    /// The download query, restricted to trees changed after `max_time_stamp`
    /// when it is positive.
    pub fn query(&self, max_time_stamp: i64) -> SyncResult<String> {
        let parent = &self.relationship.parent;
        let children = &self.relationship.children;

        let child_fields = with_required_fields(
            &self.children_field_list,
            &[children.id_field(), children.modification_date_field()],
        );
        let mut fields = with_required_fields(
            &self.parent_field_list,
            &[parent.id_field(), parent.modification_date_field()],
        );
        fields.push(self.nested_select(&child_fields));

        let mut predicates = Vec::new();
        let filter = self.parent_filter.trim();
        if !filter.is_empty() {
            predicates.push(filter.to_string());
        }
        if max_time_stamp > 0 {
            let ts = format_timestamp(max_time_stamp).ok_or_else(|| {
                SyncError::configuration(format!("timestamp out of range: {max_time_stamp}"))
            })?;
            predicates.push(format!(
                "({pmod} > {ts} or {pid} in (select {ref_field} from {child} where {cmod} > {ts}))",
                pmod = parent.modification_date_field(),
                pid = parent.id_field(),
                ref_field = children.parent_id_field(),
                child = children.object_type(),
                cmod = children.modification_date_field(),
            ));
        }
        self.build(fields, predicates)
    }

    /// The ids-only query covering every matching parent and child.
    pub fn ids_query(&self) -> SyncResult<String> {
        let fields = vec![
            self.relationship.parent.id_field().to_string(),
            self.nested_select(&[self.relationship.children.id_field().to_string()]),
        ];
        let filter = self.parent_filter.trim();
        let predicates = if filter.is_empty() {
            Vec::new()
        } else {
            vec![filter.to_string()]
        };
        self.build(fields, predicates)
    }

    fn build(&self, fields: Vec<String>, predicates: Vec<String>) -> SyncResult<String> {
        let mut builder =
            QueryBuilder::with_fields(&fields).from(self.relationship.parent.object_type());
        match predicates.as_slice() {
            [] => {}
            [only] => builder = builder.where_clause(only.as_str()),
            [first, rest @ ..] => {
                builder = builder.where_clause(format!("({first}) and {}", rest.join(" and ")));
            }
        }
        builder
            .build()
            .ok_or_else(|| SyncError::configuration("parent/children target has no parent type"))
    }

    fn nested_children<'a>(&self, parent: &'a Value) -> &'a [Value] {
        match parent.get(&self.relationship.children.object_type_plural) {
            Some(Value::Object(nested)) => nested
                .get("records")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            Some(Value::Array(records)) => records,
            _ => &[],
        }
    }

    fn take_children(&self, parent: &mut Value) -> Vec<Value> {
        let Value::Object(map) = parent else {
            return Vec::new();
        };
        match map.remove(&self.relationship.children.object_type_plural) {
            Some(Value::Object(mut nested)) => match nested.remove("records") {
                Some(Value::Array(records)) => records,
                _ => Vec::new(),
            },
            Some(Value::Array(records)) => records,
            _ => Vec::new(),
        }
    }

    /// True if the local parent or any of its local children is dirty.
    fn tree_is_dirty(&self, ctx: &SyncContext<'_>, parent_id: &str) -> SyncResult<bool> {
        let parent = &self.relationship.parent;
        let children = &self.relationship.children;
        let local = ctx
            .store
            .lookup(ctx.soup_name, parent.id_field(), &Value::from(parent_id))?;
        if local.is_some_and(|record| is_dirty(&record)) {
            return Ok(true);
        }
        let query = StoreQuery::all(children.soup_name(), 1).filter(StoreFilter::And(vec![
            StoreFilter::Equals(children.parent_id_field().to_string(), Value::from(parent_id)),
            dirty_filter(),
        ]));
        Ok(ctx.store.count(&query)? > 0)
    }

    fn remote_universe(
        &self,
        ctx: &SyncContext<'_>,
    ) -> SyncResult<(HashSet<String>, HashSet<String>)> {
        let records = self.core.fetch_all(ctx.remote, &self.ids_query()?)?;
        let parents = string_ids(&records, self.relationship.parent.id_field());
        let children = records
            .iter()
            .flat_map(|parent| {
                string_ids(
                    self.nested_children(parent),
                    self.relationship.children.id_field(),
                )
            })
            .collect();
        Ok((parents.into_iter().collect(), children))
    }
}

impl DownloadTarget for ParentChildrenTarget {
    fn start_fetch(
        &mut self,
        ctx: &SyncContext<'_>,
        max_time_stamp: i64,
    ) -> SyncResult<Vec<Value>> {
        ctx.store
            .create_collection(self.relationship.children.soup_name())?;
        let query = self.query(max_time_stamp)?;
        tracing::debug!(soup = ctx.soup_name, %query, "starting parent/children fetch");
        self.core.start(ctx.remote, &query)
    }

    fn continue_fetch(&mut self, ctx: &SyncContext<'_>) -> SyncResult<Option<Vec<Value>>> {
        self.core.more(ctx.remote)
    }

    fn total_size(&self) -> i64 {
        self.core.total_size()
    }

    fn id_field(&self) -> &str {
        self.relationship.parent.id_field()
    }

    fn modification_date_field(&self) -> &str {
        self.relationship.parent.modification_date_field()
    }

    fn latest_modification_time_stamp(&self, records: &[Value]) -> i64 {
        let child_field = self.relationship.children.modification_date_field();
        records
            .iter()
            .map(|parent| latest_time_stamp(self.nested_children(parent), child_field))
            .fold(self.core.latest_time_stamp(records), i64::max)
    }

    fn save_records(
        &mut self,
        ctx: &SyncContext<'_>,
        records: Vec<Value>,
        merge_mode: MergeMode,
    ) -> SyncResult<usize> {
        let parent_info = &self.relationship.parent;
        let children_info = &self.relationship.children;
        let mut saved = 0;

        for mut parent in records {
            let children = self.take_children(&mut parent);
            let parent_id = parent
                .get(parent_info.id_field())
                .and_then(Value::as_str)
                .map(str::to_string);

            if merge_mode == MergeMode::LeaveIfChanged {
                if let Some(id) = parent_id.as_deref() {
                    if self.tree_is_dirty(ctx, id)? {
                        tracing::debug!(
                            soup = ctx.soup_name,
                            parent = id,
                            "leaving locally modified tree"
                        );
                        continue;
                    }
                }
            }

            if let Value::Object(map) = &mut parent {
                mark_clean(map);
            }
            let stored = ctx
                .store
                .upsert(ctx.soup_name, vec![parent], UpsertKey::Field(parent_info.id_field()))?;
            let local_id = stored.first().and_then(soup_entry_id);
            saved += 1;

            let children: Vec<Value> = children
                .into_iter()
                .map(|mut child| {
                    if let Value::Object(map) = &mut child {
                        mark_clean(map);
                        map.insert(
                            children_info.parent_id_field().to_string(),
                            parent_id.clone().map_or(Value::Null, Value::from),
                        );
                        map.insert(
                            children_info.parent_local_id_field().to_string(),
                            local_id.map_or(Value::Null, Value::from),
                        );
                    }
                    child
                })
                .collect();
            if !children.is_empty() {
                ctx.store.upsert(
                    children_info.soup_name(),
                    children,
                    UpsertKey::Field(children_info.id_field()),
                )?;
            }
        }
        Ok(saved)
    }

    fn remote_ids(&mut self, ctx: &SyncContext<'_>) -> SyncResult<HashSet<String>> {
        Ok(self.remote_universe(ctx)?.0)
    }

    /// Removes orphans: clean parents gone remotely (with their clean
    /// children under master/detail) and clean children gone remotely.
    fn clean_ghosts(&mut self, ctx: &SyncContext<'_>) -> SyncResult<usize> {
        let parent_info = &self.relationship.parent;
        let children_info = &self.relationship.children;
        let page_size = ctx.config.store_page_size;
        let (remote_parents, remote_children) = self.remote_universe(ctx)?;

        let mut child_projection = flag_projection(children_info.id_field());
        child_projection.push(children_info.parent_id_field().to_string());
        let child_rows = collect_all(
            ctx.store,
            &StoreQuery::all(children_info.soup_name(), page_size)
                .filter(StoreFilter::NotNull(children_info.id_field().to_string()))
                .project(child_projection),
        )?;
        let parent_ref = |row: &Value| {
            row.get(children_info.parent_id_field())
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let parents_with_dirty_children: HashSet<String> = child_rows
            .iter()
            .filter(|row| is_dirty(row))
            .filter_map(parent_ref)
            .collect();
        let master_detail = self.relationship.relationship_type == RelationshipType::MasterDetail;

        let parent_rows = collect_all(
            ctx.store,
            &StoreQuery::all(ctx.soup_name, page_size)
                .filter(StoreFilter::NotNull(parent_info.id_field().to_string()))
                .project(flag_projection(parent_info.id_field())),
        )?;
        let mut kept_parents = HashSet::new();
        let mut deleted_parents = HashSet::new();
        let mut parent_entries = Vec::new();
        for row in &parent_rows {
            let Some(id) = row.get(parent_info.id_field()).and_then(Value::as_str) else {
                continue;
            };
            let orphaned = !remote_parents.contains(id)
                && !is_dirty(row)
                && !(master_detail && parents_with_dirty_children.contains(id));
            match (orphaned, row.get(SOUP_ENTRY_ID).and_then(Value::as_i64)) {
                (true, Some(entry)) => {
                    parent_entries.push(entry);
                    deleted_parents.insert(id.to_string());
                }
                _ => {
                    kept_parents.insert(id.to_string());
                }
            }
        }

        let mut child_entries = Vec::new();
        for row in child_rows.iter().filter(|row| !is_dirty(row)) {
            let Some(entry) = row.get(SOUP_ENTRY_ID).and_then(Value::as_i64) else {
                continue;
            };
            let Some(parent) = parent_ref(row) else {
                continue;
            };
            let orphaned = if deleted_parents.contains(&parent) {
                master_detail
            } else {
                let parent_present =
                    kept_parents.contains(&parent) || remote_parents.contains(&parent);
                let child_gone = row
                    .get(children_info.id_field())
                    .and_then(Value::as_str)
                    .is_some_and(|id| !remote_children.contains(id));
                parent_present && child_gone
            };
            if orphaned {
                child_entries.push(entry);
            }
        }

        if !child_entries.is_empty() {
            ctx.store.delete(children_info.soup_name(), &child_entries)?;
        }
        if !parent_entries.is_empty() {
            ctx.store.delete(ctx.soup_name, &parent_entries)?;
        }
        let removed = child_entries.len() + parent_entries.len();
        if removed > 0 {
            tracing::info!(
                soup = ctx.soup_name,
                parents = parent_entries.len(),
                children = child_entries.len(),
                "removed orphaned records"
            );
        }
        Ok(removed)
    }

    fn finish_run(&mut self, ctx: &SyncContext<'_>) -> SyncResult<usize> {
        self.clean_ghosts(ctx)
    }

    fn to_json(&self) -> SyncResult<Value> {
        tagged(self, "parent_children")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::registry::TargetRegistry;
    use crate::remote::{MockRemote, QueryResponse};
    use crate::store::{LocalStore, MemoryStore};
    use crate::target::tests::context;
    use crate::target::FetchTarget;
    use serde_json::json;

    fn relationship(kind: RelationshipType) -> ParentChildRelationship {
        ParentChildRelationship::new(
            ParentInfo::new("Account"),
            ChildrenInfo::new("Contact", "Contacts", "contacts", "AccountId", "AccountLocalId"),
            kind,
        )
        .unwrap()
    }

    fn target(kind: RelationshipType) -> ParentChildrenTarget {
        ParentChildrenTarget::new(relationship(kind), ["Name"], "", ["LastName"])
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection("accounts").unwrap();
        store.create_collection("contacts").unwrap();
        store
    }

    #[test]
    fn blank_reference_fields_are_rejected() {
        let err = ParentChildRelationship::new(
            ParentInfo::new("Account"),
            ChildrenInfo::new("Contact", "Contacts", "contacts", "", "AccountLocalId"),
            RelationshipType::Lookup,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("children parent id field"));
    }

    #[test]
    fn builds_nested_query() {
        let target = target(RelationshipType::MasterDetail);
        assert_eq!(
            target.query(0).unwrap(),
            "select Name, Id, LastModifiedDate, \
             (select LastName, Id, LastModifiedDate from Contacts) from Account"
        );
        assert_eq!(
            target.ids_query().unwrap(),
            "select Id, (select Id from Contacts) from Account"
        );
    }

    #[test]
    fn incremental_query_sees_child_changes() {
        let target = ParentChildrenTarget::new(
            relationship(RelationshipType::Lookup),
            ["Name"],
            "Industry = 'Tech'",
            ["LastName"],
        );
        let query = target.query(1_700_000_000_000).unwrap();
        assert!(query.ends_with(
            "from Account where (Industry = 'Tech') and \
             (LastModifiedDate > 2023-11-14T22:13:20.000+0000 or Id in \
             (select AccountId from Contact where LastModifiedDate > 2023-11-14T22:13:20.000+0000))"
        ));
    }

    #[test]
    fn json_round_trip_validates() {
        let target = target(RelationshipType::MasterDetail);
        let value = target.to_json().unwrap();
        assert_eq!(value["type"], "parent_children");
        assert_eq!(value["relationshipType"], "MASTER_DETAIL");
        assert_eq!(value["children"]["sobjectTypePlural"], "Contacts");
        assert_eq!(value["parentFieldlist"], json!(["Name"]));

        let registry = TargetRegistry::new();
        let rebuilt = FetchTarget::from_json(&value, &registry).unwrap();
        assert_eq!(rebuilt.id_field(), "Id");

        let mut broken = value.clone();
        broken["children"]["parentLocalIdFieldName"] = json!(" ");
        assert!(FetchTarget::from_json(&broken, &registry)
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn flattens_children_with_parent_references() {
        let store = store();
        let remote = MockRemote::new();
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let page = vec![json!({
            "Id": "A1",
            "Name": "Acme",
            "LastModifiedDate": "2023-11-14T22:13:20.000+0000",
            "Contacts": {"totalSize": 2, "done": true, "records": [
                {"Id": "C1", "LastName": "Doe", "LastModifiedDate": "2023-11-14T22:13:25.000+0000"},
                {"Id": "C2", "LastName": "Roe"},
            ]},
        })];
        let mut target = target(RelationshipType::MasterDetail);
        assert_eq!(target.latest_modification_time_stamp(&page), 1_700_000_005_000);
        assert_eq!(target.save_records(&ctx, page, MergeMode::Overwrite).unwrap(), 1);

        let parents = store.records("accounts");
        assert_eq!(parents.len(), 1);
        assert!(parents[0].get("Contacts").is_none());
        let children = store.records("contacts");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0]["AccountId"], "A1");
        assert_eq!(children[0]["AccountLocalId"], parents[0]["_soupEntryId"]);
        assert_eq!(children[1]["__local__"], false);
    }

    #[test]
    fn leave_if_changed_skips_dirty_trees() {
        let store = store();
        store
            .upsert(
                "contacts",
                vec![json!({"Id": "C1", "AccountId": "A1", "LastName": "mine", "__local__": true, "__locally_updated__": true})],
                UpsertKey::EntryId,
            )
            .unwrap();
        let remote = MockRemote::new();
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let page = vec![
            json!({"Id": "A1", "Contacts": {"records": [{"Id": "C1", "LastName": "theirs"}]}}),
            json!({"Id": "A2", "Contacts": null}),
        ];
        let mut target = target(RelationshipType::Lookup);
        assert_eq!(target.save_records(&ctx, page, MergeMode::LeaveIfChanged).unwrap(), 1);

        let parents = store.records("accounts");
        assert_eq!(parents.len(), 1);
        assert_eq!(parents[0]["Id"], "A2");
        assert_eq!(store.records("contacts")[0]["LastName"], "mine");
    }

    #[test]
    fn orphan_cleanup_removes_clean_orphans_only() {
        let store = store();
        store
            .upsert(
                "accounts",
                vec![json!({"Id": "A1"}), json!({"Id": "A2"})],
                UpsertKey::EntryId,
            )
            .unwrap();
        store
            .upsert(
                "contacts",
                vec![
                    json!({"Id": "C1", "AccountId": "A1"}),
                    json!({"Id": "C2", "AccountId": "A1"}),
                    json!({"Id": "C3", "AccountId": "A1", "__local__": true, "__locally_updated__": true}),
                    json!({"Id": "C4", "AccountId": "A2"}),
                ],
                UpsertKey::EntryId,
            )
            .unwrap();
        let remote = MockRemote::new();
        remote.push_query(QueryResponse::single(vec![
            json!({"Id": "A1", "Contacts": {"records": [{"Id": "C1"}]}}),
        ]));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let mut target = target(RelationshipType::MasterDetail);
        assert_eq!(target.finish_run(&ctx).unwrap(), 3);

        let parents: Vec<Value> = store.records("accounts").iter().map(|r| r["Id"].clone()).collect();
        assert_eq!(parents, vec![json!("A1")]);
        let children: Vec<Value> = store.records("contacts").iter().map(|r| r["Id"].clone()).collect();
        assert_eq!(children, vec![json!("C1"), json!("C3")]);
        assert_eq!(remote.queries()[0], "select Id, (select Id from Contacts) from Account");
    }

    #[test]
    fn lookup_children_survive_parent_removal() {
        let store = store();
        store
            .upsert("accounts", vec![json!({"Id": "A2"})], UpsertKey::EntryId)
            .unwrap();
        store
            .upsert("contacts", vec![json!({"Id": "C4", "AccountId": "A2"})], UpsertKey::EntryId)
            .unwrap();
        let remote = MockRemote::new();
        remote.push_query(QueryResponse::single(vec![]));
        let config = SyncConfig::default();
        let ctx = context(&remote, &store, &config, "accounts");

        let mut target = target(RelationshipType::Lookup);
        assert_eq!(target.clean_ghosts(&ctx).unwrap(), 1);
        assert!(store.records("accounts").is_empty());
        assert_eq!(store.records("contacts").len(), 1);
    }
}
