// Mobile app branch provisioning
// Creating a mobile app record queues a job that sets up the app's branch in
// a shared template repository.

pub mod cli;
pub mod config;
pub mod git;
pub mod models;
pub mod observability;
pub mod observer;
pub mod provisioning;
pub mod queue;
pub mod shutdown;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use config::{config, BranchNaming, ProvisionerConfig, WorkspaceStrategy};
pub use git::{Git2Operations, GitOperations};
pub use models::{MobileApp, NewMobileApp};
pub use observer::{MobileAppObserver, MobileAppService, ProvisioningTrigger, ServiceError};
pub use provisioning::{ProvisionOutcome, ProvisioningError, ProvisioningStep, ProvisioningWorker};
pub use queue::{InMemoryQueue, JobHandler, JobQueue, ProvisionJob, QueuedJob, WorkerPool};
pub use shutdown::ShutdownCoordinator;
pub use store::{InMemoryStore, MobileAppStore, StoreError};
pub use telemetry::init_telemetry;
