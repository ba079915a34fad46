//! Queue transport for provisioning jobs.
//!
//! Delivery is at-least-once: a job whose handler fails is delivered again
//! until it runs out of attempts, and then lands in the failed-jobs ledger.

pub mod memory;

pub use memory::{CompletedJob, FailedJob, InMemoryQueue, WorkerPool};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::MobileApp;
use crate::provisioning::{ProvisionOutcome, ProvisioningError};

/// Payload of one provisioning task: the record as it was when queued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionJob {
    pub app: MobileApp,
}

impl ProvisionJob {
    pub fn new(app: MobileApp) -> Self {
        Self { app }
    }

    pub fn app_id(&self) -> i64 {
        self.app.id
    }
}

/// Transport envelope around a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    /// Delivery number, starting at 1
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub job: ProvisionJob,
}

impl QueuedJob {
    pub fn new(job: ProvisionJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            attempt: 1,
            enqueued_at: Utc::now(),
            job,
        }
    }

    pub(crate) fn next_attempt(&self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is full ({capacity} jobs waiting)")]
    Full { capacity: usize },

    /// The transport stopped accepting jobs, e.g. after its workers shut down
    #[error("queue is closed")]
    Closed,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a job and return its message id. Never waits for capacity.
    async fn dispatch(&self, job: ProvisionJob) -> Result<Uuid, QueueError>;
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &QueuedJob) -> Result<ProvisionOutcome, ProvisioningError>;
}
