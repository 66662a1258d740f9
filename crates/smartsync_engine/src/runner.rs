//! Blocking job execution.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::job::{JobStore, SyncDirection, SyncJob, SyncStatus};
use crate::options::SyncOptions;
use crate::registry::TargetRegistry;
use crate::remote::RemoteService;
use crate::store::LocalStore;
use crate::target::{
    sync_up_record, DownloadTarget, FetchTarget, PushTarget, RecordOutcome, SyncContext,
    UploadTarget,
};

/// Cooperative cancellation flag shared between a caller and a run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The run stops at the next page or record
    /// boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records received from the server.
    pub records_fetched: usize,
    /// Downloaded records written to the local store.
    pub records_saved: usize,
    /// Records created on the server.
    pub created: usize,
    /// Records updated on the server.
    pub updated: usize,
    /// Records deleted on the server or dropped locally.
    pub deleted: usize,
    /// Records left alone because the server copy changed.
    pub conflicts: usize,
    /// Records rejected by the server.
    pub failures: usize,
    /// Local records removed because they no longer exist remotely.
    pub ghosts_removed: usize,
}

/// Final job state and counters of a successful run.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// The job as persisted at the end of the run.
    pub job: SyncJob,
    /// Counters of the run.
    pub report: SyncReport,
}

/// Progress notification broadcast while jobs run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A run started.
    Started {
        /// Job id.
        job_id: i64,
    },
    /// A page or batch was applied.
    Progress {
        /// Job id.
        job_id: i64,
        /// Percentage, 0 to 100.
        progress: u8,
        /// Records processed so far.
        processed: usize,
        /// Records expected, -1 if unknown.
        total_size: i64,
    },
    /// A run ended.
    Finished {
        /// Job id.
        job_id: i64,
        /// DONE or FAILED.
        status: SyncStatus,
        /// Error of a failed run.
        error: Option<String>,
    },
}

/// Runs jobs on the calling thread.
///
/// The runner owns the store and remote handles, the custom target registry
/// and the progress channel. [`SyncOrchestrator`](crate::SyncOrchestrator)
/// wraps one to run jobs in the background.
///
/// Whether a job is in progress is tracked in memory. A job persisted as
/// RUNNING that this runner is not running was cut short (crash, kill) and
/// is run again from its last persisted `maxTimeStamp`.
pub struct JobRunner {
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteService>,
    registry: TargetRegistry,
    config: SyncConfig,
    events: broadcast::Sender<SyncEvent>,
    active: Mutex<HashSet<i64>>,
}

/// Removes a job from the in-flight set when the run ends, however it ends.
struct ActiveRun<'a> {
    active: &'a Mutex<HashSet<i64>>,
    job_id: i64,
}

impl<'a> ActiveRun<'a> {
    fn claim(active: &'a Mutex<HashSet<i64>>, job_id: i64) -> SyncResult<Self> {
        if !active.lock().insert(job_id) {
            return Err(SyncError::JobRunning(job_id));
        }
        Ok(Self { active, job_id })
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.active.lock().remove(&self.job_id);
    }
}

impl JobRunner {
    /// Creates a runner with the default configuration and no custom
    /// targets.
    pub fn new(store: Arc<dyn LocalStore>, remote: Arc<dyn RemoteService>) -> Self {
        let config = SyncConfig::default();
        let (events, _) = broadcast::channel(config.event_capacity);
        Self {
            store,
            remote,
            registry: TargetRegistry::new(),
            config,
            events,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        self.events = events;
        self.config = config;
        self
    }

    /// Replaces the custom target registry.
    pub fn with_registry(mut self, registry: TargetRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Custom target registry.
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// Local store.
    pub fn store(&self) -> &dyn LocalStore {
        self.store.as_ref()
    }

    /// Subscribes to progress events of every run.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    fn job_store(&self) -> JobStore<'_> {
        JobStore::new(self.store.as_ref(), self.config.store_page_size)
    }

    fn context<'a>(&'a self, soup_name: &'a str) -> SyncContext<'a> {
        SyncContext {
            remote: self.remote.as_ref(),
            store: self.store.as_ref(),
            soup_name,
            config: &self.config,
        }
    }

    fn ensure_collection(&self, soup_name: &str) -> SyncResult<()> {
        if soup_name.trim().is_empty() {
            return Err(SyncError::configuration("soup name must not be empty"));
        }
        if !self.store.has_collection(soup_name) {
            self.store.create_collection(soup_name)?;
        }
        Ok(())
    }

    /// Creates and saves a NEW download job.
    ///
    /// Fails with a configuration error when the name is taken or the
    /// target cannot be rebuilt from its JSON.
    pub fn create_sync_down(
        &self,
        target: &FetchTarget,
        options: SyncOptions,
        soup_name: &str,
        name: Option<&str>,
    ) -> SyncResult<SyncJob> {
        let json = target.to_json()?;
        FetchTarget::from_json(&json, &self.registry)?;
        self.create_job(SyncDirection::Down, json, options, soup_name, name)
    }

    /// Creates and saves a NEW upload job.
    pub fn create_sync_up(
        &self,
        target: &PushTarget,
        options: SyncOptions,
        soup_name: &str,
        name: Option<&str>,
    ) -> SyncResult<SyncJob> {
        let json = target.to_json()?;
        PushTarget::from_json(&json, &self.registry)?;
        self.create_job(SyncDirection::Up, json, options, soup_name, name)
    }

    fn create_job(
        &self,
        direction: SyncDirection,
        target: serde_json::Value,
        options: SyncOptions,
        soup_name: &str,
        name: Option<&str>,
    ) -> SyncResult<SyncJob> {
        self.ensure_collection(soup_name)?;
        let mut job = SyncJob::new(direction, name.map(str::to_string), target, options, soup_name);
        self.job_store().insert(&mut job)?;
        info!(job_id = job.id(), soup = soup_name, ?direction, name, "sync job created");
        Ok(job)
    }

    /// Loads a job by id.
    pub fn job(&self, job_id: i64) -> SyncResult<SyncJob> {
        self.job_store().get(job_id)
    }

    /// Loads a job by name.
    pub fn job_by_name(&self, name: &str) -> SyncResult<SyncJob> {
        self.job_store()
            .find_by_name(name)?
            .ok_or_else(|| SyncError::JobNotFound(name.to_string()))
    }

    /// Lists every job.
    pub fn jobs(&self) -> SyncResult<Vec<SyncJob>> {
        self.job_store().list()
    }

    /// Deletes a job. Synced records are kept.
    pub fn delete_job(&self, job_id: i64) -> SyncResult<()> {
        self.job_store().delete(job_id)?;
        info!(job_id, "sync job deleted");
        Ok(())
    }

    /// Deletes a job by name.
    pub fn delete_job_by_name(&self, name: &str) -> SyncResult<()> {
        let job = self.job_by_name(name)?;
        self.delete_job(job.id())
    }

    fn emit(&self, event: SyncEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn persist_progress(&self, job: &mut SyncJob, processed: usize) -> SyncResult<()> {
        job.set_progress(processed);
        self.job_store().save(job)?;
        self.emit(SyncEvent::Progress {
            job_id: job.id(),
            progress: job.progress(),
            processed,
            total_size: job.total_size(),
        });
        Ok(())
    }

    /// Returns true while this runner is running the job.
    pub fn is_running(&self, job_id: i64) -> bool {
        self.active.lock().contains(&job_id)
    }

    /// Runs a job to completion on the calling thread.
    ///
    /// The job ends DONE, or FAILED with the error persisted; a FAILED run
    /// also returns the error. A job this runner is already running is
    /// rejected with [`SyncError::JobRunning`].
    pub fn run(&self, job_id: i64, cancel: &CancelToken) -> SyncResult<SyncOutcome> {
        let _active = ActiveRun::claim(&self.active, job_id)?;
        let mut job = self.job(job_id)?;
        if job.mark_interrupted() {
            warn!(job_id, "sync job was left running by an earlier run, starting over");
        }
        job.begin_run()?;
        self.job_store().save(&job)?;
        info!(
            job_id,
            soup = job.soup_name(),
            direction = ?job.direction(),
            max_time_stamp = job.max_time_stamp(),
            "sync job started"
        );
        self.emit(SyncEvent::Started { job_id });

        let mut report = SyncReport::default();
        let result = match job.direction() {
            SyncDirection::Down => self.run_down(&mut job, cancel, &mut report),
            SyncDirection::Up => self.run_up(&mut job, cancel, &mut report),
        };

        match result {
            Ok(()) => {
                job.complete()?;
                self.job_store().save(&job)?;
                info!(
                    job_id,
                    fetched = report.records_fetched,
                    created = report.created,
                    updated = report.updated,
                    deleted = report.deleted,
                    conflicts = report.conflicts,
                    failures = report.failures,
                    "sync job done"
                );
                self.emit(SyncEvent::Finished {
                    job_id,
                    status: SyncStatus::Done,
                    error: None,
                });
                Ok(SyncOutcome { job, report })
            }
            Err(err) => {
                let message = err.to_string();
                job.fail(message.clone())?;
                if let Err(save_err) = self.job_store().save(&job) {
                    warn!(job_id, error = %save_err, "could not persist failed job");
                }
                warn!(job_id, error = %message, "sync job failed");
                self.emit(SyncEvent::Finished {
                    job_id,
                    status: SyncStatus::Failed,
                    error: Some(message),
                });
                Err(err)
            }
        }
    }

    fn run_down(
        &self,
        job: &mut SyncJob,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let mut target = FetchTarget::from_json(job.target(), &self.registry)?;
        let soup_name = job.soup_name().to_string();
        let merge_mode = job.options().merge_mode;
        let ctx = self.context(&soup_name);

        cancel.check()?;
        let mut page = target.start_fetch(&ctx, job.max_time_stamp())?;
        job.set_total_size(target.total_size());
        let mut processed = 0;
        // pages are not ordered by modification date, so the job's mark only
        // moves once every page is in
        let mut latest = job.max_time_stamp();
        loop {
            let fetched = page.len();
            latest = latest.max(target.latest_modification_time_stamp(&page));
            report.records_saved += target.save_records(&ctx, page, merge_mode)?;
            report.records_fetched += fetched;
            processed += fetched;
            self.persist_progress(job, processed)?;
            debug!(
                job_id = job.id(),
                soup = %soup_name,
                records = fetched,
                latest,
                "page applied"
            );

            cancel.check()?;
            match target.continue_fetch(&ctx)? {
                Some(next) => page = next,
                None => break,
            }
        }
        report.ghosts_removed += target.finish_run(&ctx)?;
        job.advance_max_time_stamp(latest);
        Ok(())
    }

    fn run_up(
        &self,
        job: &mut SyncJob,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> SyncResult<()> {
        let target = PushTarget::from_json(job.target(), &self.registry)?;
        let soup_name = job.soup_name().to_string();
        let options = job.options().clone();
        let ctx = self.context(&soup_name);
        let page_size = self.config.store_page_size;

        let ids = target.ids_of_records_to_sync_up(ctx.store, &soup_name, page_size)?;
        job.set_total_size(ids.len() as i64);
        self.persist_progress(job, 0)?;

        let mut processed = 0;
        for batch in ids.chunks(page_size) {
            for record in ctx.store.retrieve(&soup_name, batch)? {
                cancel.check()?;
                match sync_up_record(&target, &ctx, &options, record)? {
                    RecordOutcome::Created => report.created += 1,
                    RecordOutcome::Updated => report.updated += 1,
                    RecordOutcome::Deleted => report.deleted += 1,
                    RecordOutcome::Conflict => {
                        debug!(
                            job_id = job.id(),
                            soup = %soup_name,
                            "server copy changed, record left dirty"
                        );
                        report.conflicts += 1;
                    }
                    RecordOutcome::Rejected(_) => report.failures += 1,
                }
                processed += 1;
            }
            self.persist_progress(job, processed)?;
        }
        Ok(())
    }

    /// Runs a job, running it again after retryable failures as configured
    /// by [`SyncConfig::retry`].
    pub fn run_with_retry(&self, job_id: i64, cancel: &CancelToken) -> SyncResult<SyncOutcome> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = retry.delay_for_attempt(attempt);
                debug!(job_id, attempt, ?delay, "retrying sync job");
                std::thread::sleep(delay);
                cancel.check()?;
            }

            match self.run(job_id, cancel) {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    if e.is_retryable() && attempt + 1 < max_attempts {
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SyncError::Protocol("no sync attempts made".into())))
    }

    /// Deletes the clean local records of a download job that no longer
    /// exist on the server, and returns how many were removed.
    pub fn clean_ghosts(&self, job_id: i64) -> SyncResult<usize> {
        let job = self.job(job_id)?;
        if job.direction() != SyncDirection::Down {
            return Err(SyncError::configuration(
                "ghost cleanup only applies to download jobs",
            ));
        }
        let mut target = FetchTarget::from_json(job.target(), &self.registry)?;
        let removed = target.clean_ghosts(&self.context(job.soup_name()))?;
        info!(job_id, soup = job.soup_name(), records = removed, "ghost cleanup done");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MergeMode;
    use crate::remote::{MockRemote, QueryResponse};
    use crate::store::{MemoryStore, UpsertKey};
    use crate::target::{DefaultPushTarget, QueryTarget};
    use serde_json::json;

    fn runner() -> (Arc<MemoryStore>, Arc<MockRemote>, JobRunner) {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let runner = JobRunner::new(store.clone(), remote.clone());
        (store, remote, runner)
    }

    fn account(id: &str, modified: &str) -> serde_json::Value {
        json!({"attributes": {"type": "Account"}, "Id": id, "Name": id, "LastModifiedDate": modified})
    }

    #[test]
    fn download_persists_progress_and_time_stamp() {
        let (store, remote, runner) = runner();
        remote.push_query(QueryResponse::page(
            3,
            vec![
                account("1", "2023-11-14T22:13:20.000+0000"),
                account("2", "2023-11-14T22:13:25.000+0000"),
            ],
            "/next/1",
        ));
        remote.add_page(
            "/next/1",
            QueryResponse::single(vec![account("3", "2023-11-14T22:13:21.000+0000")]),
        );
        let mut events = runner.subscribe();

        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id, Name from Account").into(),
                SyncOptions::default(),
                "accounts",
                Some("accounts"),
            )
            .unwrap();
        let outcome = runner.run(job.id(), &CancelToken::new()).unwrap();

        assert_eq!(outcome.job.status(), SyncStatus::Done);
        assert_eq!(outcome.job.total_size(), 3);
        assert_eq!(outcome.job.progress(), 100);
        assert_eq!(outcome.job.max_time_stamp(), 1_700_000_005_000);
        assert_eq!(outcome.report.records_fetched, 3);
        assert_eq!(store.records("accounts").len(), 3);
        assert_eq!(
            runner.job(job.id()).unwrap().to_json().unwrap(),
            outcome.job.to_json().unwrap()
        );

        assert_eq!(events.try_recv().unwrap(), SyncEvent::Started { job_id: job.id() });
        assert!(matches!(
            events.try_recv().unwrap(),
            SyncEvent::Progress { progress: 66, processed: 2, total_size: 3, .. }
        ));
    }

    #[test]
    fn transport_failure_marks_job_failed() {
        let (_, remote, runner) = runner();
        remote.push_query_error("connection reset");
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        let err = runner.run(job.id(), &CancelToken::new()).unwrap_err();
        assert!(err.is_retryable());
        let job = runner.job(job.id()).unwrap();
        assert_eq!(job.status(), SyncStatus::Failed);
        assert_eq!(job.error(), Some("transport error: connection reset"));
        assert!(job.end_time() > 0);
    }

    #[test]
    fn cancelled_run_fails_with_reason() {
        let (store, remote, runner) = runner();
        remote.push_query(QueryResponse::page(
            2,
            vec![account("1", "2023-11-14T22:13:20.000+0000")],
            "/next/1",
        ));
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(runner.run(job.id(), &cancel), Err(SyncError::Cancelled)));
        let job = runner.job(job.id()).unwrap();
        assert_eq!(job.status(), SyncStatus::Failed);
        assert_eq!(job.error(), Some("cancelled"));
        assert!(store.records("accounts").is_empty());
        assert!(remote.requests().is_empty());
    }

    #[test]
    fn job_left_running_is_run_again() {
        let (store, remote, runner) = runner();
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id, LastModifiedDate from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();
        let mut stale = job.clone();
        stale.begin_run().unwrap();
        stale.advance_max_time_stamp(1_700_000_000_000);
        JobStore::new(store.as_ref(), 10).save(&stale).unwrap();
        drop(runner);

        let runner = JobRunner::new(store.clone(), remote.clone());
        assert!(!runner.is_running(job.id()));
        remote.push_query(QueryResponse::single(vec![account(
            "1",
            "2023-11-14T22:13:30.000+0000",
        )]));
        let outcome = runner.run(job.id(), &CancelToken::new()).unwrap();

        assert_eq!(outcome.job.status(), SyncStatus::Done);
        assert_eq!(outcome.job.error(), None);
        assert_eq!(outcome.job.max_time_stamp(), 1_700_000_010_000);
        assert!(remote.queries()[0].contains("where LastModifiedDate > 2023-11-14T22:13:20.000+0000"));
        assert!(!runner.is_running(job.id()));
    }

    #[test]
    fn job_in_flight_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let remote = Arc::new(MockRemote::new());
        let runner = Arc::new(JobRunner::new(store.clone(), remote.clone()));
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id, LastModifiedDate from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        let nested = Arc::new(Mutex::new(None));
        let (seen, inner, job_id) = (nested.clone(), Arc::downgrade(&runner), job.id());
        remote.set_query_handler(move |_| {
            if let Some(runner) = inner.upgrade() {
                let result = runner.run(job_id, &CancelToken::new());
                *seen.lock() = Some((runner.is_running(job_id), result.map(|o| o.job.status())));
            }
            Some(QueryResponse::single(vec![]))
        });

        let outcome = runner.run(job.id(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.job.status(), SyncStatus::Done);
        let (running, result) = nested.lock().take().unwrap();
        assert!(running);
        assert!(matches!(result, Err(SyncError::JobRunning(id)) if id == job.id()));
        assert!(!runner.is_running(job.id()));
    }

    #[test]
    fn failed_page_keeps_previous_time_stamp() {
        let (_, remote, runner) = runner();
        remote.push_query(QueryResponse::page(
            3,
            vec![
                account("1", "2023-11-14T22:13:20.000+0000"),
                account("2", "2023-11-14T22:13:22.000+0000"),
            ],
            "/next/1",
        ));
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id, LastModifiedDate from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        assert!(runner.run(job.id(), &CancelToken::new()).is_err());
        let job = runner.job(job.id()).unwrap();
        assert_eq!(job.status(), SyncStatus::Failed);
        assert_eq!(job.max_time_stamp(), -1);
        assert_eq!(job.progress(), 66);
    }

    #[test]
    fn upload_counts_outcomes() {
        let (store, remote, runner) = runner();
        store.create_collection("accounts").unwrap();
        store
            .upsert(
                "accounts",
                vec![
                    json!({"attributes": {"type": "Account"}, "Name": "new", "__local__": true, "__locally_created__": true}),
                    json!({"attributes": {"type": "Account"}, "Id": "001", "Name": "edit", "__local__": true, "__locally_updated__": true}),
                    json!({"Id": "002", "Name": "untyped", "__local__": true, "__locally_updated__": true}),
                    json!({"attributes": {"type": "Account"}, "Id": "003", "Name": "clean"}),
                ],
                UpsertKey::EntryId,
            )
            .unwrap();

        let job = runner
            .create_sync_up(
                &DefaultPushTarget::new().into(),
                SyncOptions::new(MergeMode::Overwrite),
                "accounts",
                None,
            )
            .unwrap();
        let outcome = runner.run(job.id(), &CancelToken::new()).unwrap();

        assert_eq!(outcome.job.status(), SyncStatus::Done);
        assert_eq!(outcome.job.total_size(), 3);
        assert_eq!(outcome.report.created, 1);
        assert_eq!(outcome.report.updated, 1);
        assert_eq!(outcome.report.failures, 1);
        assert_eq!(remote.requests().len(), 2);
    }

    #[test]
    fn retry_reruns_after_transport_error() {
        let (_, remote, runner) = runner();
        let runner = runner.with_config(
            SyncConfig::default().with_retry(
                crate::config::RetryConfig::new(3)
                    .with_initial_delay(std::time::Duration::from_millis(1))
                    .without_jitter(),
            ),
        );
        remote.push_query_error("timeout");
        remote.push_query(QueryResponse::single(vec![account("1", "2023-11-14T22:13:20.000+0000")]));
        let job = runner
            .create_sync_down(
                &QueryTarget::new("select Id from Account").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        let outcome = runner.run_with_retry(job.id(), &CancelToken::new()).unwrap();
        assert_eq!(outcome.job.status(), SyncStatus::Done);
        assert_eq!(remote.queries().len(), 2);
    }

    #[test]
    fn configuration_errors_are_not_retried() {
        let (_, remote, runner) = runner();
        let runner = runner.with_config(SyncConfig::default().with_retry(
            crate::config::RetryConfig::new(3).with_initial_delay(std::time::Duration::ZERO),
        ));
        let job = runner
            .create_sync_down(
                &QueryTarget::new("not a query").into(),
                SyncOptions::default(),
                "accounts",
                None,
            )
            .unwrap();

        let err = runner.run_with_retry(job.id(), &CancelToken::new()).unwrap_err();
        assert!(!err.is_retryable());
        assert!(remote.requests().is_empty());
    }

    #[test]
    fn job_lookup_and_delete() {
        let (_, _, runner) = runner();
        let job = runner
            .create_sync_up(&PushTarget::default(), SyncOptions::default(), "accounts", Some("up"))
            .unwrap();
        assert_eq!(runner.job_by_name("up").unwrap().id(), job.id());
        assert_eq!(runner.jobs().unwrap().len(), 1);
        assert!(runner
            .create_sync_up(&PushTarget::default(), SyncOptions::default(), "accounts", Some("up"))
            .unwrap_err()
            .is_configuration());

        runner.delete_job_by_name("up").unwrap();
        assert!(matches!(runner.job_by_name("up"), Err(SyncError::JobNotFound(_))));
        assert!(matches!(
            runner.clean_ghosts(job.id()),
            Err(SyncError::JobNotFound(_))
        ));
    }
}
