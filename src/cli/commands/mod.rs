use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use crate::config::ProvisionerConfig;
use crate::observer::{MobileAppService, ProvisioningTrigger};
use crate::provisioning::ProvisioningWorker;
use crate::queue::{InMemoryQueue, WorkerPool};
use crate::store::{InMemoryStore, MobileAppStore};

use super::Commands;

pub mod create;
pub mod inspect;
pub mod provision;
pub mod work;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self, context: &ProvisionerContext) -> Result<()>;
}

/// Everything a command needs, wired from configuration
pub struct ProvisionerContext {
    pub config: ProvisionerConfig,
    pub store: Arc<dyn MobileAppStore>,
    pub queue: Arc<InMemoryQueue>,
    pub trigger: Arc<ProvisioningTrigger>,
    pub service: MobileAppService,
    /// Whether records outlive this process
    pub durable: bool,
}

impl ProvisionerContext {
    pub async fn build(config: ProvisionerConfig) -> Result<Self> {
        let (store, durable) = open_store(&config).await?;
        let queue = Arc::new(InMemoryQueue::new(config.queue.capacity));
        let trigger = Arc::new(ProvisioningTrigger::new(queue.clone()));
        let service = MobileAppService::new(store.clone()).observe(trigger.clone());

        Ok(Self {
            config,
            store,
            queue,
            trigger,
            service,
            durable,
        })
    }

    /// Commands that read records from earlier runs cannot work on a store
    /// that starts empty every time
    pub fn require_durable_store(&self, command: &str) -> Result<()> {
        if !self.durable {
            anyhow::bail!(
                "`{command}` needs a database: without one every run starts with no records. \
                 Configure [database] and build with the `database` feature."
            );
        }
        Ok(())
    }

    pub fn start_workers(&self) -> WorkerPool {
        let worker = ProvisioningWorker::new(
            self.store.clone(),
            &self.config.repository,
            &self.config.provisioning,
        );
        WorkerPool::start(
            self.queue.clone(),
            Arc::new(worker),
            self.config.queue.workers,
            self.config.queue.max_attempts,
        )
    }
}

#[cfg(feature = "database")]
async fn open_store(config: &ProvisionerConfig) -> Result<(Arc<dyn MobileAppStore>, bool)> {
    if let Some(db_config) = &config.database {
        tracing::info!("Using database at {}", db_config.url);
        let store = crate::store::SqliteStore::connect(db_config).await?;
        return Ok((Arc::new(store), true));
    }
    warn!("No database configured, records only live for this process");
    Ok((Arc::new(InMemoryStore::new()), false))
}

#[cfg(not(feature = "database"))]
async fn open_store(_config: &ProvisionerConfig) -> Result<(Arc<dyn MobileAppStore>, bool)> {
    warn!("Database feature not enabled, records only live for this process");
    Ok((Arc::new(InMemoryStore::new()), false))
}

pub async fn run(command: Commands, config: ProvisionerConfig) -> Result<()> {
    if let Commands::Config = command {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    let context = ProvisionerContext::build(config).await?;
    match command {
        Commands::Create {
            owner,
            name,
            package,
            version,
        } => {
            create::CreateCommand::new(owner, name, package, version)
                .execute(&context)
                .await
        }
        Commands::Provision { id } => provision::ProvisionCommand::new(id).execute(&context).await,
        Commands::Show { id } => inspect::ShowCommand::new(id).execute(&context).await,
        Commands::Pending => inspect::PendingCommand.execute(&context).await,
        Commands::Work { interval } => work::WorkCommand::new(interval).execute(&context).await,
        Commands::Config => Ok(()),
    }
}
