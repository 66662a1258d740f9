//! Background job execution.
//!
//! The orchestrator owns a worker task that takes job requests off a queue
//! and runs them one at a time on Tokio's blocking pool. Callers get a
//! [`SyncHandle`] back immediately and await the outcome on it; progress is
//! available through [`SyncOrchestrator::subscribe`].

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::options::SyncOptions;
use crate::runner::{CancelToken, JobRunner, SyncEvent, SyncOutcome};
use crate::target::{FetchTarget, PushTarget};

struct RunRequest {
    job_id: i64,
    cancel: CancelToken,
    reply: oneshot::Sender<SyncResult<SyncOutcome>>,
}

/// Handle on a queued run.
#[derive(Debug)]
pub struct SyncHandle {
    job_id: i64,
    cancel: CancelToken,
    reply: oneshot::Receiver<SyncResult<SyncOutcome>>,
}

impl SyncHandle {
    /// Id of the job.
    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    /// Requests cancellation of the run.
    ///
    /// A run that has not started yet fails as soon as it starts.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The run's cancellation token.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the run to end.
    pub async fn wait(self) -> SyncResult<SyncOutcome> {
        self.reply.await.map_err(|_| SyncError::Shutdown)?
    }
}

/// Runs sync jobs in the background, one at a time.
pub struct SyncOrchestrator {
    runner: Arc<JobRunner>,
    queue: mpsc::UnboundedSender<RunRequest>,
    worker: JoinHandle<()>,
}

impl SyncOrchestrator {
    /// Starts the worker task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(runner: JobRunner) -> Self {
        let runner = Arc::new(runner);
        let (queue, requests) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(Arc::clone(&runner), requests));
        info!("sync orchestrator started");
        Self {
            runner,
            queue,
            worker,
        }
    }

    /// The underlying runner, for job management.
    pub fn runner(&self) -> &JobRunner {
        &self.runner
    }

    /// Subscribes to progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.runner.subscribe()
    }

    /// Queues a run of an existing job.
    pub fn submit(&self, job_id: i64) -> SyncResult<SyncHandle> {
        self.runner.job(job_id)?;
        let cancel = CancelToken::new();
        let (reply, receiver) = oneshot::channel();
        self.queue
            .send(RunRequest {
                job_id,
                cancel: cancel.clone(),
                reply,
            })
            .map_err(|_| SyncError::Shutdown)?;
        debug!(job_id, "sync job queued");
        Ok(SyncHandle {
            job_id,
            cancel,
            reply: receiver,
        })
    }

    /// Creates a download job and queues its first run.
    pub fn sync_down(
        &self,
        target: &FetchTarget,
        options: SyncOptions,
        soup_name: &str,
        name: Option<&str>,
    ) -> SyncResult<SyncHandle> {
        let job = self.runner.create_sync_down(target, options, soup_name, name)?;
        self.submit(job.id())
    }

    /// Creates an upload job and queues its first run.
    pub fn sync_up(
        &self,
        target: &PushTarget,
        options: SyncOptions,
        soup_name: &str,
        name: Option<&str>,
    ) -> SyncResult<SyncHandle> {
        let job = self.runner.create_sync_up(target, options, soup_name, name)?;
        self.submit(job.id())
    }

    /// Queues another run of a named job.
    pub fn resync_by_name(&self, name: &str) -> SyncResult<SyncHandle> {
        let job = self.runner.job_by_name(name)?;
        self.submit(job.id())
    }

    /// Stops accepting runs and waits for the queued ones to finish.
    pub async fn shutdown(self) -> SyncResult<()> {
        let Self { queue, worker, .. } = self;
        drop(queue);
        worker
            .await
            .map_err(|e| SyncError::Worker(e.to_string()))?;
        info!("sync orchestrator stopped");
        Ok(())
    }
}

async fn run_worker(runner: Arc<JobRunner>, mut requests: mpsc::UnboundedReceiver<RunRequest>) {
    while let Some(request) = requests.recv().await {
        let RunRequest {
            job_id,
            cancel,
            reply,
        } = request;
        let runner = Arc::clone(&runner);
        let result = tokio::task::spawn_blocking(move || runner.run_with_retry(job_id, &cancel))
            .await
            .unwrap_or_else(|e| Err(SyncError::Worker(e.to_string())));
        if reply.send(result).is_err() {
            debug!(job_id, "sync handle dropped before the run ended");
        }
    }
}
