use anyhow::Result;
use tracing::warn;

use super::{Command, ProvisionerContext};
use crate::models::NewMobileApp;
use crate::shutdown::ShutdownCoordinator;

/// Creates the record and runs the worker pool until its job is done.
///
/// The queue lives in this process, so returning before the job ran would
/// drop it.
pub struct CreateCommand {
    app: NewMobileApp,
}

impl CreateCommand {
    pub fn new(owner_id: i64, name: String, package: String, version: Option<String>) -> Self {
        let mut app = NewMobileApp::new(owner_id, name, package);
        app.version = version;
        Self { app }
    }
}

impl Command for CreateCommand {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()> {
        let pool = context.start_workers();
        let app = context.service.create(self.app.clone()).await?;
        println!("Created mobile app #{} ({})", app.id, app.package);
        if !context.durable {
            warn!("Record #{} will be gone when this process exits", app.id);
        }

        pool.wait_idle().await;
        ShutdownCoordinator::new(pool).shutdown().await?;

        let app = context.service.find(app.id).await?;
        match app.branch {
            Some(branch) => println!("Branch: {branch}"),
            None => {
                let failed = context.queue.failed_jobs().await;
                let reason = failed
                    .iter()
                    .rev()
                    .find(|f| f.job.job.app_id() == app.id)
                    .map(|f| f.error.as_str())
                    .unwrap_or("unknown error");
                anyhow::bail!("Provisioning failed for app #{}: {reason}", app.id);
            }
        }
        Ok(())
    }
}
