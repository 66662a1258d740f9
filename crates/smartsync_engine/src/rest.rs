//! REST implementation of [`RemoteService`].
//!
//! The HTTP stack is abstracted by [`HttpClient`] so any client library
//! (reqwest, hyper, ureq) can be plugged in. Bodies are JSON.

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::remote::{QueryResponse, RemoteResponse, RemoteService};

/// Default API version path.
pub const DEFAULT_API_PATH: &str = "/services/data/v58.0";

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PATCH.
    Patch,
    /// DELETE.
    Delete,
}

/// An HTTP request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Path and query string, relative to the instance URL.
    pub path: String,
    /// JSON body.
    pub body: Option<Vec<u8>>,
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

/// HTTP client abstraction.
///
/// `Err` means the request never got a response (network failure) and is
/// treated as retryable.
pub trait HttpClient: Send + Sync {
    /// Sends a request.
    fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

/// A [`RemoteService`] speaking the REST record API.
pub struct RestRemote<C: HttpClient> {
    api_path: String,
    client: C,
    last_error: RwLock<Option<String>>,
}

fn encode(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
}

fn parse_body(body: &[u8]) -> SyncResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| SyncError::Protocol(format!("Failed to decode response: {e}")))
}

impl<C: HttpClient> RestRemote<C> {
    /// Creates a client for the default API version.
    pub fn new(client: C) -> Self {
        Self::with_api_path(DEFAULT_API_PATH, client)
    }

    /// Creates a client for a specific API path, e.g. `/services/data/v60.0`.
    pub fn with_api_path(api_path: impl Into<String>, client: C) -> Self {
        Self {
            api_path: api_path.into().trim_end_matches('/').to_string(),
            client,
            last_error: RwLock::new(None),
        }
    }

    /// Returns the API path.
    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn send(
        &self,
        method: HttpMethod,
        path: String,
        body: Option<&Map<String, Value>>,
    ) -> SyncResult<HttpResponse> {
        let body = body.map(serde_json::to_vec).transpose()?;
        tracing::trace!(?method, %path, "remote request");
        let response = self
            .client
            .send(HttpRequest { method, path, body })
            .map_err(|e| {
                *self.last_error.write() = Some(e.clone());
                SyncError::transport_retryable(e)
            })?;
        *self.last_error.write() = None;
        Ok(response)
    }

    fn get_json(&self, path: String) -> SyncResult<Value> {
        let response = self.send(HttpMethod::Get, path, None)?;
        let body = parse_body(&response.body)?;
        if !(200..300).contains(&response.status) {
            let message = RemoteResponse::new(response.status, body).error_message();
            return Err(if response.status >= 500 {
                SyncError::transport_retryable(message)
            } else {
                SyncError::Protocol(message)
            });
        }
        Ok(body)
    }

    fn write(
        &self,
        method: HttpMethod,
        path: String,
        body: Option<&Map<String, Value>>,
    ) -> SyncResult<RemoteResponse> {
        let response = self.send(method, path, body)?;
        Ok(RemoteResponse::new(response.status, parse_body(&response.body)?))
    }
}

impl<C: HttpClient> RemoteService for RestRemote<C> {
    fn query(&self, query: &str) -> SyncResult<QueryResponse> {
        let body = self.get_json(format!("{}/query?q={}", self.api_path, encode(query)))?;
        Ok(serde_json::from_value(body)?)
    }

    fn query_more(&self, next_records_url: &str) -> SyncResult<QueryResponse> {
        let body = self.get_json(next_records_url.to_string())?;
        Ok(serde_json::from_value(body)?)
    }

    fn search(&self, search: &str) -> SyncResult<Value> {
        self.get_json(format!("{}/search?q={}", self.api_path, encode(search)))
    }

    fn recently_viewed(&self, object_type: &str, limit: usize) -> SyncResult<Vec<String>> {
        let body = self.get_json(format!("{}/sobjects/{}", self.api_path, encode(object_type)))?;
        let items = body
            .get("recentItems")
            .and_then(Value::as_array)
            .ok_or_else(|| SyncError::Protocol("missing recentItems".into()))?;
        Ok(items
            .iter()
            .filter_map(|item| item.get("Id").and_then(Value::as_str))
            .take(limit)
            .map(str::to_string)
            .collect())
    }

    fn create(&self, object_type: &str, fields: &Map<String, Value>) -> SyncResult<RemoteResponse> {
        self.write(
            HttpMethod::Post,
            format!("{}/sobjects/{}", self.api_path, encode(object_type)),
            Some(fields),
        )
    }

    fn update(
        &self,
        object_type: &str,
        id: &str,
        fields: &Map<String, Value>,
    ) -> SyncResult<RemoteResponse> {
        self.write(
            HttpMethod::Patch,
            format!("{}/sobjects/{}/{}", self.api_path, encode(object_type), encode(id)),
            Some(fields),
        )
    }

    fn delete(&self, object_type: &str, id: &str) -> SyncResult<RemoteResponse> {
        self.write(
            HttpMethod::Delete,
            format!("{}/sobjects/{}/{}", self.api_path, encode(object_type), encode(id)),
            None,
        )
    }
}
