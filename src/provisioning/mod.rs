//! Per-app branch provisioning.
//!
//! A [`ProvisioningWorker`] turns one queued job into a branch in the
//! template repository: create the branch, record it on the app, commit a
//! marker file and push.

pub mod branch_name;
mod error;
pub mod worker;
pub mod workspace;

pub use branch_name::{deterministic_branch_name, is_valid_branch_name, random_branch_name};
pub use error::{ProvisioningError, ProvisioningStep};
pub use worker::ProvisioningWorker;
pub use workspace::{Workspace, WorkspaceProvider};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProvisionOutcome {
    /// This run created or moved the remote branch
    Provisioned {
        app_id: i64,
        branch: String,
        commit: String,
    },
    /// The remote branch already pointed at the marker commit
    AlreadyProvisioned { app_id: i64, branch: String },
}

impl ProvisionOutcome {
    pub fn branch(&self) -> &str {
        match self {
            ProvisionOutcome::Provisioned { branch, .. }
            | ProvisionOutcome::AlreadyProvisioned { branch, .. } => branch,
        }
    }
}

/// Marker file committed on a branch, relative to the repository root
pub fn marker_file_name(branch: &str) -> PathBuf {
    PathBuf::from(format!("{branch}.txt"))
}
