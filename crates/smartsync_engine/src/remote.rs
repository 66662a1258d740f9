//! Remote service abstraction.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{SyncError, SyncResult};

/// One page of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// Total number of records matching the query.
    pub total_size: i64,
    /// Records of this page.
    #[serde(default)]
    pub records: Vec<Value>,
    /// Cursor for the next page, absent on the last page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_records_url: Option<String>,
}

impl QueryResponse {
    /// Creates a single-page response.
    pub fn single(records: Vec<Value>) -> Self {
        Self {
            total_size: records.len() as i64,
            records,
            next_records_url: None,
        }
    }

    /// Creates a page followed by `next_records_url`.
    pub fn page(total_size: i64, records: Vec<Value>, next_records_url: impl Into<String>) -> Self {
        Self {
            total_size,
            records,
            next_records_url: Some(next_records_url.into()),
        }
    }
}

/// Status and body of a create, update or delete call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Response body, `Null` when empty.
    pub body: Value,
}

impl RemoteResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Returns true for a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Returns the id of a created record.
    pub fn created_id(&self) -> Option<&str> {
        self.body
            .get("id")
            .or_else(|| self.body.get("Id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Returns the server's error message, or a generic one.
    pub fn error_message(&self) -> String {
        let entry = match &self.body {
            Value::Array(errors) => errors.first(),
            other => Some(other),
        };
        entry
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("remote call failed with status {}", self.status))
    }
}

/// The remote record service.
pub trait RemoteService: Send + Sync {
    /// Runs a query and returns its first page.
    fn query(&self, query: &str) -> SyncResult<QueryResponse>;

    /// Follows a pagination cursor.
    fn query_more(&self, next_records_url: &str) -> SyncResult<QueryResponse>;

    /// Runs a full-text search and returns the raw response.
    fn search(&self, search: &str) -> SyncResult<Value>;

    /// Returns the ids of the most recently viewed records of a type.
    fn recently_viewed(&self, object_type: &str, limit: usize) -> SyncResult<Vec<String>>;

    /// Creates a record.
    fn create(&self, object_type: &str, fields: &Map<String, Value>) -> SyncResult<RemoteResponse>;

    /// Updates a record.
    fn update(
        &self,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse>;

    /// Deletes a record.
    fn delete(&self, object_type: &str, id: &str) -> SyncResult<RemoteResponse>;
}

/// A request seen by [`MockRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockRequest {
    /// `query`.
    Query(String),
    /// `query_more`.
    QueryMore(String),
    /// `search`.
    Search(String),
    /// `recently_viewed`.
    RecentlyViewed(String),
    /// `create`.
    Create {
        /// Object type.
        object_type: String,
        /// Payload.
        fields: Map<String, Value>,
    },
    /// `update`.
    Update {
        /// Object type.
        object_type: String,
        /// Record id.
        id: String,
        /// Payload.
        fields: Map<String, Value>,
    },
    /// `delete`.
    Delete {
        /// Object type.
        object_type: String,
        /// Record id.
        id: String,
    },
}

type Scripted<T> = Mutex<VecDeque<Result<T, String>>>;
type QueryHandler = Box<dyn Fn(&str) -> Option<QueryResponse> + Send + Sync>;

/// A scripted remote service for testing.
///
/// Queued replies are consumed in order; an `Err` reply becomes a
/// retryable transport error. When the query queue is empty the query
/// handler is consulted. Writes default to success with a generated id.
#[derive(Default)]
pub struct MockRemote {
    disconnected: AtomicBool,
    next_id: AtomicU64,
    requests: Mutex<Vec<MockRequest>>,
    queries: Scripted<QueryResponse>,
    query_handler: Mutex<Option<QueryHandler>>,
    pages: Mutex<HashMap<String, QueryResponse>>,
    searches: Scripted<Value>,
    recent: Mutex<Vec<String>>,
    writes: Scripted<RemoteResponse>,
}

impl std::fmt::Debug for MockRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRemote")
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockRemote {
    /// Creates a connected mock with no scripted replies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }

    /// Queues a query reply.
    pub fn push_query(&self, response: QueryResponse) {
        self.queries.lock().push_back(Ok(response));
    }

    /// Queues a query failure.
    pub fn push_query_error(&self, message: impl Into<String>) {
        self.queries.lock().push_back(Err(message.into()));
    }

    /// Answers queries not covered by the queue.
    pub fn set_query_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> Option<QueryResponse> + Send + Sync + 'static,
    {
        *self.query_handler.lock() = Some(Box::new(handler));
    }

    /// Registers the page returned for a pagination cursor.
    pub fn add_page(&self, next_records_url: impl Into<String>, response: QueryResponse) {
        self.pages.lock().insert(next_records_url.into(), response);
    }

    /// Queues a search reply.
    pub fn push_search(&self, response: Value) {
        self.searches.lock().push_back(Ok(response));
    }

    /// Sets the recently viewed ids.
    pub fn set_recently_viewed<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.recent.lock() = ids.into_iter().map(Into::into).collect();
    }

    /// Queues a reply for the next create, update or delete.
    pub fn push_write(&self, response: RemoteResponse) {
        self.writes.lock().push_back(Ok(response));
    }

    /// Queues a failure for the next create, update or delete.
    pub fn push_write_error(&self, message: impl Into<String>) {
        self.writes.lock().push_back(Err(message.into()));
    }

    /// Returns every request seen so far.
    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().clone()
    }

    /// Returns the text of every `query` request.
    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .filter_map(|r| match r {
                MockRequest::Query(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: MockRequest) -> SyncResult<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("not connected"));
        }
        self.requests.lock().push(request);
        Ok(())
    }

    fn next_write(&self, default: impl FnOnce() -> RemoteResponse) -> SyncResult<RemoteResponse> {
        match self.writes.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(SyncError::transport_retryable(message)),
            None => Ok(default()),
        }
    }
}

impl RemoteService for MockRemote {
    fn query(&self, query: &str) -> SyncResult<QueryResponse> {
        self.record(MockRequest::Query(query.to_string()))?;
        if let Some(reply) = self.queries.lock().pop_front() {
            return reply.map_err(SyncError::transport_retryable);
        }
        self.query_handler
            .lock()
            .as_ref()
            .and_then(|handler| handler(query))
            .ok_or_else(|| SyncError::Protocol(format!("no mock response for query: {query}")))
    }

    fn query_more(&self, next_records_url: &str) -> SyncResult<QueryResponse> {
        self.record(MockRequest::QueryMore(next_records_url.to_string()))?;
        self.pages
            .lock()
            .get(next_records_url)
            .cloned()
            .ok_or_else(|| SyncError::Protocol(format!("no mock page for {next_records_url}")))
    }

    fn search(&self, search: &str) -> SyncResult<Value> {
        self.record(MockRequest::Search(search.to_string()))?;
        match self.searches.lock().pop_front() {
            Some(reply) => reply.map_err(SyncError::transport_retryable),
            None => Ok(json!([])),
        }
    }

    fn recently_viewed(&self, object_type: &str, limit: usize) -> SyncResult<Vec<String>> {
        self.record(MockRequest::RecentlyViewed(object_type.to_string()))?;
        Ok(self.recent.lock().iter().take(limit).cloned().collect())
    }

    fn create(&self, object_type: &str, fields: &Map<String, Value>) -> SyncResult<RemoteResponse> {
        self.record(MockRequest::Create {
            object_type: object_type.to_string(),
            fields: fields.clone(),
        })?;
        self.next_write(|| {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            RemoteResponse::new(201, json!({"id": format!("MOCK{n:08}"), "success": true}))
        })
    }

    fn update(
        &self,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        self.record(MockRequest::Update {
            object_type: object_type.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        })?;
        self.next_write(|| RemoteResponse::new(204, Value::Null))
    }

    fn delete(&self, object_type: &str, id: &str) -> SyncResult<RemoteResponse> {
        self.record(MockRequest::Delete {
            object_type: object_type.to_string(),
            id: id.to_string(),
        })?;
        self.next_write(|| RemoteResponse::new(204, Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_helpers() {
        let created = RemoteResponse::new(201, json!({"id": "001X"}));
        assert!(created.is_success());
        assert_eq!(created.created_id(), Some("001X"));

        let missing = RemoteResponse::new(
            404,
            json!([{"message": "entity is deleted", "errorCode": "ENTITY_IS_DELETED"}]),
        );
        assert!(missing.is_not_found());
        assert_eq!(missing.error_message(), "entity is deleted");

        let bare = RemoteResponse::new(500, Value::Null);
        assert_eq!(bare.error_message(), "remote call failed with status 500");
    }

    #[test]
    fn query_response_json_shape() {
        let response: QueryResponse = serde_json::from_value(json!({
            "totalSize": 3,
            "done": false,
            "records": [{"Id": "1"}],
            "nextRecordsUrl": "/query/01g-2000",
        }))
        .unwrap();
        assert_eq!(response.total_size, 3);
        assert_eq!(response.next_records_url.as_deref(), Some("/query/01g-2000"));
    }

    #[test]
    fn mock_not_connected_error() {
        let remote = MockRemote::new();
        remote.set_connected(false);
        let err = remote.query("select Id from Account").unwrap_err();
        assert!(err.is_retryable());
        assert!(remote.requests().is_empty());
    }

    #[test]
    fn mock_scripted_queries() {
        let remote = MockRemote::new();
        remote.push_query(QueryResponse::single(vec![json!({"Id": "1"})]));
        remote.push_query_error("timeout");
        remote.set_query_handler(|q| q.contains("Contact").then(|| QueryResponse::single(vec![])));

        assert_eq!(remote.query("a").unwrap().records.len(), 1);
        assert!(remote.query("b").unwrap_err().is_retryable());
        assert_eq!(remote.query("select Id from Contact").unwrap().total_size, 0);
        assert!(matches!(remote.query("c"), Err(SyncError::Protocol(_))));
        assert_eq!(remote.queries().len(), 4);
    }

    #[test]
    fn mock_writes_default_to_success() {
        let remote = MockRemote::new();
        let created = remote.create("Account", &Map::new()).unwrap();
        assert_eq!(created.created_id(), Some("MOCK00000001"));
        assert!(remote.update("Account", "1", &Map::new()).unwrap().is_success());

        remote.push_write(RemoteResponse::new(404, Value::Null));
        assert!(remote.delete("Account", "1").unwrap().is_not_found());
        assert_eq!(remote.requests().len(), 3);
    }
}
