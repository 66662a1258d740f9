//! # SmartSync Engine
//!
//! Offline-first record synchronization between a remote record service and
//! a local JSON document store.
//!
//! This crate provides:
//! - Download targets (query, search, most recently used, refresh,
//!   parent with children, custom) and upload targets (default, custom)
//! - Persistent sync jobs with a NEW → RUNNING → DONE/FAILED state machine
//! - Incremental re-sync driven by each job's `maxTimeStamp`
//! - Merge modes for local edits and server-side changes
//! - Ghost cleanup of local records deleted on the server
//! - A blocking [`JobRunner`] and a background [`SyncOrchestrator`]
//! - Store and remote contracts with in-memory and REST implementations
//!
//! ## Architecture
//!
//! A job stores its target as tagged JSON. Every run rebuilds the target
//! from that JSON (custom variants through the [`TargetRegistry`]), then:
//! 1. Download: fetch page by page, upsert each page by server id, and
//!    advance `maxTimeStamp` once the last page is applied
//! 2. Upload: walk the dirty local records, create, update or delete each
//!    one on the server and clear its local flags
//!
//! ## Key Invariants
//!
//! - Job names are unique
//! - `totalSize` is set once per run, before the first page is applied
//! - `maxTimeStamp` never decreases
//! - Conflicts and per-record rejections never fail a run
//! - Transport errors fail the run and leave it safe to run again

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod job;
mod options;
mod orchestrator;
pub mod record;
mod registry;
mod remote;
mod rest;
mod runner;
mod store;
mod target;

pub use config::{RetryConfig, SyncConfig, DEFAULT_REFRESH_BATCH_SIZE, DEFAULT_STORE_PAGE_SIZE};
pub use error::{StoreError, SyncError, SyncResult};
pub use job::{SyncDirection, SyncJob, SyncStatus, SYNCS_SOUP};
pub use options::{MergeMode, SyncOptions};
pub use orchestrator::{SyncHandle, SyncOrchestrator};
pub use registry::TargetRegistry;
pub use remote::{MockRemote, MockRequest, QueryResponse, RemoteResponse, RemoteService};
pub use rest::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RestRemote, DEFAULT_API_PATH};
pub use runner::{CancelToken, JobRunner, SyncEvent, SyncOutcome, SyncReport};
pub use store::{collect_all, LocalStore, MemoryStore, StoreFilter, StoreQuery, UpsertKey};
pub use target::{
    ChildrenInfo, CustomFetchTarget, CustomPushTarget, DefaultPushTarget, DownloadTarget,
    FetchTarget, ParentChildRelationship, ParentChildrenTarget, ParentInfo, PushTarget,
    QueryCore, QueryTarget, RecentTarget, RefreshTarget, RelationshipType, SearchTarget,
    SyncContext, UploadTarget, DEFAULT_RECENT_LIMIT,
};
