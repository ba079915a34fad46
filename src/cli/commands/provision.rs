use anyhow::Result;

use super::{Command, ProvisionerContext};
use crate::shutdown::ShutdownCoordinator;

/// Re-run provisioning for an app whose earlier run never finished
pub struct ProvisionCommand {
    id: i64,
}

impl ProvisionCommand {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl Command for ProvisionCommand {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()> {
        context.require_durable_store("provision")?;
        let pool = context.start_workers();
        let job_id = context.service.reprovision(self.id, &context.trigger).await?;
        println!("Queued job {job_id} for app #{}", self.id);

        pool.wait_idle().await;
        ShutdownCoordinator::new(pool).shutdown().await?;

        match context.service.find(self.id).await?.branch {
            Some(branch) => println!("Branch: {branch}"),
            None => anyhow::bail!("App #{} still has no branch", self.id),
        }
        Ok(())
    }
}
