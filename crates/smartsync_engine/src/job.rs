//! Persistent sync jobs.
//!
//! A job is one row of the [`SYNCS_SOUP`] collection. It records what to
//! sync (a serialized target), how (options) and where (the local
//! collection), plus the state of its latest run:
//!
//! ```text
//! NEW → RUNNING → DONE
//!             ↘ FAILED
//! ```
//!
//! A DONE or FAILED job may be run again. Starting such a run resets the
//! per-run fields and keeps `maxTimeStamp`, so the next download only asks
//! for records modified since the last one.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::options::SyncOptions;
use crate::record::soup_entry_id;
use crate::store::{collect_all, LocalStore, StoreQuery, UpsertKey};

/// Collection holding the job records.
pub const SYNCS_SOUP: &str = "syncs_soup";

/// Error stored on a job whose run was cut short without being recorded.
pub(crate) const INTERRUPTED: &str = "interrupted";

const NAME_FIELD: &str = "name";

/// Direction of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Server to local store.
    #[serde(rename = "syncDown")]
    Down,
    /// Local store to server.
    #[serde(rename = "syncUp")]
    Up,
}

/// Status of a job's latest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// Never run, or reset for a new run.
    New,
    /// A run is in progress.
    Running,
    /// The latest run completed.
    Done,
    /// The latest run failed; see [`SyncJob::error`].
    Failed,
}

impl SyncStatus {
    /// Returns true for DONE and FAILED.
    pub fn is_terminal(self) -> bool {
        matches!(self, SyncStatus::Done | SyncStatus::Failed)
    }

    /// Returns true if `next` is a legal edge within one run.
    pub fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (SyncStatus::New, SyncStatus::Running)
                | (SyncStatus::Running, SyncStatus::Done)
                | (SyncStatus::Running, SyncStatus::Failed)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStatus::New => "NEW",
            SyncStatus::Running => "RUNNING",
            SyncStatus::Done => "DONE",
            SyncStatus::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

fn unknown() -> i64 {
    -1
}

fn is_unsaved(id: &i64) -> bool {
    *id <= 0
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A configured sync and the state of its latest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    #[serde(rename = "_soupEntryId", default, skip_serializing_if = "is_unsaved")]
    id: i64,
    #[serde(rename = "type")]
    direction: SyncDirection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    target: Value,
    #[serde(default)]
    options: SyncOptions,
    soup_name: String,
    status: SyncStatus,
    #[serde(default)]
    progress: u8,
    #[serde(default = "unknown")]
    total_size: i64,
    #[serde(default = "unknown")]
    max_time_stamp: i64,
    #[serde(default = "unknown")]
    start_time: i64,
    #[serde(default = "unknown")]
    end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip)]
    total_size_set: bool,
}

impl SyncJob {
    pub(crate) fn new(
        direction: SyncDirection,
        name: Option<String>,
        target: Value,
        options: SyncOptions,
        soup_name: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            direction,
            name,
            target,
            options,
            soup_name: soup_name.into(),
            status: SyncStatus::New,
            progress: 0,
            total_size: -1,
            max_time_stamp: -1,
            start_time: -1,
            end_time: -1,
            error: None,
            total_size_set: false,
        }
    }

    /// Store-assigned id, 0 before the job is saved.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Direction.
    pub fn direction(&self) -> SyncDirection {
        self.direction
    }

    /// Unique name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Serialized target.
    pub fn target(&self) -> &Value {
        &self.target
    }

    /// Options.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Local collection synced by the job.
    pub fn soup_name(&self) -> &str {
        &self.soup_name
    }

    /// Status of the latest run.
    pub fn status(&self) -> SyncStatus {
        self.status
    }

    /// Progress of the latest run, 0 to 100.
    pub fn progress(&self) -> u8 {
        self.progress
    }

    /// Number of records the latest run expected, -1 until known.
    pub fn total_size(&self) -> i64 {
        self.total_size
    }

    /// Latest server modification time synced, -1 if unknown.
    pub fn max_time_stamp(&self) -> i64 {
        self.max_time_stamp
    }

    /// Start of the latest run in epoch milliseconds, -1 if never run.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// End of the latest run in epoch milliseconds, -1 while running.
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Error of the latest failed run.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn transition(&mut self, next: SyncStatus) -> SyncResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Moves the job to RUNNING, resetting the fields of a previous run.
    pub(crate) fn begin_run(&mut self) -> SyncResult<()> {
        if self.status.is_terminal() {
            self.status = SyncStatus::New;
            self.progress = 0;
            self.total_size = -1;
            self.start_time = -1;
            self.end_time = -1;
            self.error = None;
        }
        self.transition(SyncStatus::Running)?;
        self.total_size_set = false;
        self.start_time = now_millis();
        Ok(())
    }

    /// Fails a RUNNING job whose run is no longer in progress, e.g. after
    /// the process died mid-run. Other states are left alone.
    pub(crate) fn mark_interrupted(&mut self) -> bool {
        if self.status != SyncStatus::Running {
            return false;
        }
        self.status = SyncStatus::Failed;
        self.error = Some(INTERRUPTED.to_string());
        self.end_time = now_millis();
        true
    }

    pub(crate) fn complete(&mut self) -> SyncResult<()> {
        self.transition(SyncStatus::Done)?;
        self.progress = 100;
        self.end_time = now_millis();
        Ok(())
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) -> SyncResult<()> {
        self.transition(SyncStatus::Failed)?;
        self.error = Some(message.into());
        self.end_time = now_millis();
        Ok(())
    }

    /// Records the run's total size. Only the first call of a run applies.
    pub(crate) fn set_total_size(&mut self, total_size: i64) -> bool {
        if self.total_size_set {
            return false;
        }
        self.total_size = total_size;
        self.total_size_set = true;
        true
    }

    pub(crate) fn advance_max_time_stamp(&mut self, time_stamp: i64) {
        self.max_time_stamp = self.max_time_stamp.max(time_stamp);
    }

    pub(crate) fn set_progress(&mut self, processed: usize) {
        if self.total_size > 0 {
            let percent = processed.saturating_mul(100) / self.total_size as usize;
            self.progress = percent.min(100) as u8;
        }
    }

    /// Serializes the job as stored in [`SYNCS_SOUP`].
    pub fn to_json(&self) -> SyncResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Reads a job record.
    pub fn from_json(value: Value) -> SyncResult<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Job records of a local store.
pub(crate) struct JobStore<'a> {
    store: &'a dyn LocalStore,
    page_size: usize,
}

impl<'a> JobStore<'a> {
    pub(crate) fn new(store: &'a dyn LocalStore, page_size: usize) -> Self {
        Self { store, page_size }
    }

    fn ensure_collection(&self) -> SyncResult<()> {
        if !self.store.has_collection(SYNCS_SOUP) {
            self.store.create_collection(SYNCS_SOUP)?;
        }
        Ok(())
    }

    /// Saves a new job and assigns its id.
    pub(crate) fn insert(&self, job: &mut SyncJob) -> SyncResult<()> {
        self.ensure_collection()?;
        if let Some(name) = job.name() {
            if self.find_by_name(name)?.is_some() {
                return Err(SyncError::DuplicateJobName {
                    name: name.to_string(),
                });
            }
        }
        let saved = self
            .store
            .upsert(SYNCS_SOUP, vec![job.to_json()?], UpsertKey::EntryId)?;
        job.id = saved
            .first()
            .and_then(soup_entry_id)
            .ok_or_else(|| SyncError::Protocol("store did not assign a job id".into()))?;
        Ok(())
    }

    pub(crate) fn save(&self, job: &SyncJob) -> SyncResult<()> {
        self.store
            .upsert(SYNCS_SOUP, vec![job.to_json()?], UpsertKey::EntryId)?;
        Ok(())
    }

    pub(crate) fn get(&self, id: i64) -> SyncResult<SyncJob> {
        if !self.store.has_collection(SYNCS_SOUP) {
            return Err(SyncError::JobNotFound(id.to_string()));
        }
        let record = self
            .store
            .retrieve(SYNCS_SOUP, &[id])?
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::JobNotFound(id.to_string()))?;
        SyncJob::from_json(record)
    }

    pub(crate) fn find_by_name(&self, name: &str) -> SyncResult<Option<SyncJob>> {
        if !self.store.has_collection(SYNCS_SOUP) {
            return Ok(None);
        }
        self.store
            .lookup(SYNCS_SOUP, NAME_FIELD, &Value::from(name))?
            .map(SyncJob::from_json)
            .transpose()
    }

    pub(crate) fn list(&self) -> SyncResult<Vec<SyncJob>> {
        if !self.store.has_collection(SYNCS_SOUP) {
            return Ok(Vec::new());
        }
        collect_all(self.store, &StoreQuery::all(SYNCS_SOUP, self.page_size))?
            .into_iter()
            .map(SyncJob::from_json)
            .collect()
    }

    pub(crate) fn delete(&self, id: i64) -> SyncResult<()> {
        self.get(id)?;
        self.store.delete(SYNCS_SOUP, &[id])?;
        Ok(())
    }
}
