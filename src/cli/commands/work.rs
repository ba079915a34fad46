use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Command, ProvisionerContext};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::{generate_correlation_id, worker_identity};

/// Long-running worker: sweeps for unprovisioned apps and queues them
pub struct WorkCommand {
    interval: Duration,
}

impl WorkCommand {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    async fn sweep(&self, context: &ProvisionerContext) -> Result<usize> {
        let sweep_id = generate_correlation_id();
        let pending = context.service.pending().await?;
        debug!(sweep.id = %sweep_id, pending = pending.len(), "Sweeping for unprovisioned apps");
        let mut queued = 0;
        for app in &pending {
            match context.trigger.dispatch(app).await {
                Ok(_) => queued += 1,
                Err(e) => warn!(app.id = app.id, error = %e, "Could not queue pending app"),
            }
        }
        Ok(queued)
    }
}

impl Command for WorkCommand {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()> {
        context.require_durable_store("work")?;
        let coordinator = ShutdownCoordinator::new(context.start_workers());
        info!(worker = %worker_identity(), "Worker running, press Ctrl-C to stop");

        let signal = ShutdownCoordinator::wait_for_signal();
        tokio::pin!(signal);

        loop {
            let queued = self.sweep(context).await?;
            if queued > 0 {
                info!(queued, "Queued pending apps");
            }

            // Only sweep again once the previous batch is done
            tokio::select! {
                result = &mut signal => {
                    result?;
                    break;
                }
                _ = async {
                    coordinator.pool().wait_idle().await;
                    tokio::time::sleep(self.interval).await;
                } => {}
            }
        }

        coordinator.shutdown().await
    }
}
