use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::{JobHandler, JobQueue, ProvisionJob, QueueError, QueuedJob};
use crate::observability::provisioning_metrics;
use crate::provisioning::ProvisionOutcome;
use crate::telemetry::create_job_span;

/// A job that exhausted its attempts
#[derive(Debug, Clone)]
pub struct FailedJob {
    pub job: QueuedJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job: QueuedJob,
    pub outcome: ProvisionOutcome,
}

/// Bounded in-process queue
pub struct InMemoryQueue {
    sender: mpsc::Sender<QueuedJob>,
    receiver: Mutex<mpsc::Receiver<QueuedJob>>,
    capacity: usize,
    /// Jobs queued or being handled
    pending: AtomicUsize,
    idle: Notify,
    failed: Mutex<Vec<FailedJob>>,
    completed: Mutex<Vec<CompletedJob>>,
}

impl InMemoryQueue {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
            failed: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn failed_jobs(&self) -> Vec<FailedJob> {
        self.failed.lock().await.clone()
    }

    pub async fn completed_jobs(&self) -> Vec<CompletedJob> {
        self.completed.lock().await.clone()
    }

    /// Resolves once nothing is queued or in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Refuse further dispatches. Jobs already buffered can still be received.
    pub async fn close(&self) {
        self.receiver.lock().await.close();
    }

    fn enqueue(&self, job: QueuedJob) -> Result<(), QueueError> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn next(&self) -> Option<QueuedJob> {
        self.receiver.lock().await.recv().await
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    async fn process(&self, job: QueuedJob, handler: &dyn JobHandler, max_attempts: u32) {
        match handler.handle(&job).await {
            Ok(outcome) => {
                match &outcome {
                    ProvisionOutcome::Provisioned { branch, .. } => {
                        provisioning_metrics().record_provisioned();
                        info!(branch = %branch, "Provisioning job completed");
                    }
                    ProvisionOutcome::AlreadyProvisioned { branch, .. } => {
                        provisioning_metrics().record_already_provisioned();
                        info!(branch = %branch, "App already provisioned, nothing to do");
                    }
                }
                self.completed.lock().await.push(CompletedJob { job, outcome });
            }
            Err(err) => {
                provisioning_metrics().record_failed_attempt();

                if job.attempt < max_attempts {
                    warn!(error = %err, max_attempts, "Provisioning job failed, redelivering");
                    match self.enqueue(job.next_attempt()) {
                        // Still pending: the redelivered copy carries the count
                        Ok(()) => return,
                        Err(queue_err) => {
                            error!(error = %queue_err, "Could not redeliver job");
                        }
                    }
                } else {
                    error!(error = %err, "Provisioning job failed permanently");
                }

                provisioning_metrics().record_dead_lettered();
                self.failed.lock().await.push(FailedJob {
                    job,
                    error: format!("{err:#}"),
                    failed_at: Utc::now(),
                });
            }
        }

        self.finish_one();
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    async fn dispatch(&self, job: ProvisionJob) -> Result<Uuid, QueueError> {
        let queued = QueuedJob::new(job);
        let id = queued.id;

        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.enqueue(queued) {
            self.finish_one();
            return Err(e);
        }

        provisioning_metrics().record_enqueued();
        debug!(job.id = %id, "Provisioning job queued");
        Ok(id)
    }
}

/// Fixed set of tokio workers draining an [`InMemoryQueue`]
pub struct WorkerPool {
    queue: Arc<InMemoryQueue>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        queue: Arc<InMemoryQueue>,
        handler: Arc<dyn JobHandler>,
        workers: usize,
        max_attempts: u32,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let handles = (0..workers)
            .map(|worker_id| {
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(run_worker(worker_id, queue, handler, max_attempts, shutdown_rx))
            })
            .collect();

        info!(workers, max_attempts, "Worker pool started");
        Self {
            queue,
            shutdown,
            handles,
        }
    }

    pub fn queue(&self) -> &Arc<InMemoryQueue> {
        &self.queue
    }

    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    /// Stop pulling new jobs, wait for in-flight ones to finish, then close
    /// the queue so nothing is accepted that no worker will run
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            handle.await?;
        }
        self.queue.close().await;
        info!("Worker pool stopped");
        Ok(())
    }
}

async fn run_worker(
    worker_id: usize,
    queue: Arc<InMemoryQueue>,
    handler: Arc<dyn JobHandler>,
    max_attempts: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "Worker started");
    loop {
        if *shutdown.borrow() {
            break;
        }

        let next = tokio::select! {
            job = queue.next() => job,
            _ = shutdown.changed() => None,
        };
        let Some(job) = next else { break };

        let span = create_job_span(&job.id, job.job.app_id(), job.attempt);
        queue
            .process(job, handler.as_ref(), max_attempts)
            .instrument(span)
            .await;
    }
    debug!(worker_id, "Worker stopped");
}
