use anyhow::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::observability::provisioning_metrics;
use crate::queue::WorkerPool;

/// How long in-flight jobs get to finish once shutdown starts
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Graceful shutdown coordinator for the worker pool
pub struct ShutdownCoordinator {
    pool: WorkerPool,
}

impl ShutdownCoordinator {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Resolves on SIGINT, or SIGTERM on unix
    pub async fn wait_for_signal() -> Result<()> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut terminate = signal(SignalKind::terminate())?;
            tokio::select! {
                result = tokio::signal::ctrl_c() => result?,
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        tokio::signal::ctrl_c().await?;

        info!("Shutdown signal received");
        Ok(())
    }

    /// Stop the workers, letting in-flight jobs finish, and log final metrics
    pub async fn shutdown(self) -> Result<()> {
        info!("Initiating graceful shutdown of worker pool...");

        let pending = self.pool.queue().pending();
        if pending > 0 {
            warn!(pending, "Jobs still queued at shutdown will not run in this process");
        }

        timeout(DRAIN_TIMEOUT, self.pool.shutdown())
            .await
            .map_err(|_| anyhow::anyhow!("Timeout waiting for workers to finish"))??;

        provisioning_metrics().log_stats();
        info!("Graceful shutdown completed successfully");
        Ok(())
    }
}
