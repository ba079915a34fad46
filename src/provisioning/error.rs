use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreError;

/// Where in the workflow a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    LoadRecord,
    OpenRepository,
    CreateBranch,
    PersistBranch,
    WriteMarker,
    Commit,
    Push,
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningStep::LoadRecord => "load record",
            ProvisioningStep::OpenRepository => "open repository",
            ProvisioningStep::CreateBranch => "create branch",
            ProvisioningStep::PersistBranch => "persist branch",
            ProvisioningStep::WriteMarker => "write marker",
            ProvisioningStep::Commit => "commit",
            ProvisioningStep::Push => "push",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("git failure during {step}: {error:#}")]
    Git {
        step: ProvisioningStep,
        error: anyhow::Error,
    },

    #[error("could not write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store failure during {step}: {source}")]
    Store {
        step: ProvisioningStep,
        #[source]
        source: StoreError,
    },

    #[error("mobile app {app_id} no longer exists")]
    RecordNotFound { app_id: i64 },

    #[error("provisioning task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

impl ProvisioningError {
    pub fn git(step: ProvisioningStep, error: anyhow::Error) -> Self {
        ProvisioningError::Git { step, error }
    }

    pub fn store(step: ProvisioningStep, source: StoreError) -> Self {
        ProvisioningError::Store { step, source }
    }

    /// Step the failure happened in, when known
    pub fn step(&self) -> Option<ProvisioningStep> {
        match self {
            ProvisioningError::Git { step, .. } | ProvisioningError::Store { step, .. } => {
                Some(*step)
            }
            ProvisioningError::Io { .. } => Some(ProvisioningStep::WriteMarker),
            ProvisioningError::RecordNotFound { .. } => Some(ProvisioningStep::LoadRecord),
            ProvisioningError::Aborted(_) => None,
        }
    }
}
