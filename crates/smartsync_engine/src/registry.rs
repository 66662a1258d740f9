//! Registry of custom target implementations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::target::{DownloadTarget, UploadTarget};

type FetchFactory = Arc<dyn Fn(&Value) -> SyncResult<Box<dyn DownloadTarget>> + Send + Sync>;
type PushFactory = Arc<dyn Fn(&Value) -> SyncResult<Box<dyn UploadTarget>> + Send + Sync>;

/// Maps implementation identifiers to factories for custom targets.
///
/// A custom target's JSON carries `"type": "custom"` and an
/// `"implementation"` identifier; the factory registered under that
/// identifier receives the full JSON and rebuilds the target from it.
///
/// # Example
///
/// ```
/// use smartsync_engine::{QueryTarget, TargetRegistry};
///
/// let mut registry = TargetRegistry::new();
/// registry.register_fetch("com.acme.Accounts", |_json| {
///     Ok(Box::new(QueryTarget::new("select Id, LastModifiedDate from Account")))
/// });
/// assert!(registry.has_fetch("com.acme.Accounts"));
/// ```
#[derive(Clone, Default)]
pub struct TargetRegistry {
    fetch: HashMap<String, FetchFactory>,
    push: HashMap<String, PushFactory>,
}

impl TargetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a download target factory, replacing any previous one
    /// with the same identifier.
    pub fn register_fetch<F>(&mut self, implementation: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> SyncResult<Box<dyn DownloadTarget>> + Send + Sync + 'static,
    {
        self.fetch.insert(implementation.into(), Arc::new(factory));
    }

    /// Registers an upload target factory, replacing any previous one with
    /// the same identifier.
    pub fn register_push<F>(&mut self, implementation: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> SyncResult<Box<dyn UploadTarget>> + Send + Sync + 'static,
    {
        self.push.insert(implementation.into(), Arc::new(factory));
    }

    /// Returns true if a download factory is registered for `implementation`.
    pub fn has_fetch(&self, implementation: &str) -> bool {
        self.fetch.contains_key(implementation)
    }

    /// Returns true if an upload factory is registered for `implementation`.
    pub fn has_push(&self, implementation: &str) -> bool {
        self.push.contains_key(implementation)
    }

    pub(crate) fn build_fetch(
        &self,
        implementation: &str,
        json: &Value,
    ) -> SyncResult<Box<dyn DownloadTarget>> {
        let factory = self
            .fetch
            .get(implementation)
            .ok_or_else(|| unknown(implementation))?;
        factory(json)
    }

    pub(crate) fn build_push(
        &self,
        implementation: &str,
        json: &Value,
    ) -> SyncResult<Box<dyn UploadTarget>> {
        let factory = self
            .push
            .get(implementation)
            .ok_or_else(|| unknown(implementation))?;
        factory(json)
    }
}

fn unknown(implementation: &str) -> SyncError {
    SyncError::UnknownTarget {
        implementation: implementation.to_string(),
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut fetch: Vec<&String> = self.fetch.keys().collect();
        let mut push: Vec<&String> = self.push.keys().collect();
        fetch.sort();
        push.sort();
        f.debug_struct("TargetRegistry")
            .field("fetch", &fetch)
            .field("push", &push)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{DefaultPushTarget, FetchTarget, PushTarget, QueryTarget};
    use serde_json::json;

    #[test]
    fn custom_fetch_target_round_trips() {
        let mut registry = TargetRegistry::new();
        registry.register_fetch("com.acme.Feed", |json| {
            let query = json
                .get("feedQuery")
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::configuration("feedQuery missing"))?;
            Ok(Box::new(QueryTarget::new(query)))
        });

        let json = json!({
            "type": "custom",
            "implementation": "com.acme.Feed",
            "feedQuery": "select Id from Feed",
        });
        let target = FetchTarget::from_json(&json, &registry).unwrap();
        assert_eq!(target.tag(), "custom");

        let saved = target.to_json().unwrap();
        assert_eq!(saved["type"], "custom");
        assert_eq!(saved["implementation"], "com.acme.Feed");
        assert_eq!(saved["query"], "select Id from Feed");
    }

    #[test]
    fn factory_errors_propagate() {
        let mut registry = TargetRegistry::new();
        registry.register_fetch("com.acme.Feed", |_| {
            Err(SyncError::configuration("bad feed"))
        });
        let err = FetchTarget::from_json(
            &json!({"type": "custom", "implementation": "com.acme.Feed"}),
            &registry,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn custom_push_target() {
        let mut registry = TargetRegistry::new();
        registry.register_push("com.acme.Upload", |_| {
            Ok(Box::new(DefaultPushTarget::new().with_create_field_list(["Name"])))
        });
        assert!(registry.has_push("com.acme.Upload"));
        assert!(!registry.has_fetch("com.acme.Upload"));

        let target = PushTarget::from_json(
            &json!({"type": "custom", "implementation": "com.acme.Upload"}),
            &registry,
        )
        .unwrap();
        assert_eq!(target.tag(), "custom");
        assert_eq!(
            crate::target::UploadTarget::create_field_list(&target),
            Some(&["Name".to_string()][..])
        );

        let err = PushTarget::from_json(
            &json!({"type": "custom", "implementation": "com.acme.Other"}),
            &registry,
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::UnknownTarget { .. }));
    }

    #[test]
    fn debug_lists_identifiers() {
        let mut registry = TargetRegistry::new();
        registry.register_push("b", |_| Ok(Box::new(DefaultPushTarget::new())));
        registry.register_push("a", |_| Ok(Box::new(DefaultPushTarget::new())));
        assert_eq!(
            format!("{registry:?}"),
            r#"TargetRegistry { fetch: [], push: ["a", "b"] }"#
        );
    }
}
