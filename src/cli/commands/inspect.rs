use anyhow::Result;

use super::{Command, ProvisionerContext};
use crate::models::MobileApp;

pub struct ShowCommand {
    id: i64,
}

impl ShowCommand {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

impl Command for ShowCommand {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()> {
        context.require_durable_store("show")?;
        let app = context.service.find(self.id).await?;
        println!("{}", serde_json::to_string_pretty(&app)?);
        Ok(())
    }
}

pub struct PendingCommand;

impl Command for PendingCommand {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()> {
        context.require_durable_store("pending")?;
        let pending = context.service.pending().await?;
        if pending.is_empty() {
            println!("All apps are provisioned");
            return Ok(());
        }

        println!("{} app(s) without a branch:", pending.len());
        for app in &pending {
            println!("  {}", summary(app));
        }
        Ok(())
    }
}

fn summary(app: &MobileApp) -> String {
    format!(
        "#{} {} ({}) owner={} created={}",
        app.id,
        app.name,
        app.package,
        app.owner_id,
        app.created_at.format("%Y-%m-%d %H:%M:%S")
    )
}
