use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{ProvisioningError, ProvisioningStep};
use crate::config::{ProvisioningConfig, RepositoryConfig, WorkspaceStrategy};
use crate::git::{Git2Operations, GitOperations, PushAuth};

/// Directory a single provisioning run operates in.
///
/// Isolated workspaces are deleted when dropped.
#[derive(Debug)]
pub enum Workspace {
    Shared(PathBuf),
    Isolated(PathBuf),
}

impl Workspace {
    pub fn path(&self) -> &Path {
        match self {
            Workspace::Shared(path) | Workspace::Isolated(path) => path,
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Workspace::Isolated(path) = self {
            if let Err(e) = std::fs::remove_dir_all(&*path) {
                warn!(path = %path.display(), error = %e, "Failed to remove isolated workspace");
            } else {
                debug!(path = %path.display(), "Removed isolated workspace");
            }
        }
    }
}

/// Hands out workspaces according to the configured strategy
#[derive(Debug, Clone)]
pub struct WorkspaceProvider {
    strategy: WorkspaceStrategy,
    working_copy: PathBuf,
    workspace_root: PathBuf,
    remote: String,
    author_name: String,
    author_email: String,
    auth: PushAuth,
}

impl WorkspaceProvider {
    pub fn new(repository: &RepositoryConfig, provisioning: &ProvisioningConfig) -> Self {
        Self {
            strategy: provisioning.workspace,
            working_copy: repository.working_copy.clone(),
            workspace_root: provisioning.workspace_root.clone(),
            remote: repository.remote.clone(),
            author_name: repository.author_name.clone(),
            author_email: repository.author_email.clone(),
            auth: PushAuth {
                ssh_key_path: repository.ssh_key_path.clone(),
            },
        }
    }

    /// Open (shared) or clone (isolated) the repository for one job. Blocking.
    pub fn acquire(&self, job_id: Uuid) -> Result<(Workspace, Git2Operations), ProvisioningError> {
        let open_failed =
            |e: anyhow::Error| ProvisioningError::git(ProvisioningStep::OpenRepository, e);

        match self.strategy {
            WorkspaceStrategy::Shared => {
                let ops = Git2Operations::new(&self.working_copy)
                    .map_err(open_failed)?
                    .with_author(&self.author_name, &self.author_email)
                    .with_auth(self.auth.clone());
                Ok((Workspace::Shared(self.working_copy.clone()), ops))
            }
            WorkspaceStrategy::Isolated => {
                let url = Git2Operations::new(&self.working_copy)
                    .and_then(|template| template.remote_url(&self.remote))
                    .map_err(open_failed)?
                    .ok_or_else(|| {
                        open_failed(anyhow::anyhow!(
                            "working copy {} has no remote '{}'",
                            self.working_copy.display(),
                            self.remote
                        ))
                    })?;

                let path = self.workspace_root.join(job_id.to_string());
                if path.exists() {
                    // Left over from an earlier delivery of the same job
                    std::fs::remove_dir_all(&path).map_err(|source| ProvisioningError::Io {
                        path: path.clone(),
                        source,
                    })?;
                }
                std::fs::create_dir_all(&self.workspace_root).map_err(|source| {
                    ProvisioningError::Io {
                        path: self.workspace_root.clone(),
                        source,
                    }
                })?;

                let workspace = Workspace::Isolated(path);
                let ops = Git2Operations::clone_into(&url, workspace.path(), self.auth.clone())
                    .map_err(open_failed)?
                    .with_author(&self.author_name, &self.author_email);
                debug!(path = %workspace.path().display(), url = %url, "Cloned isolated workspace");

                Ok((workspace, ops))
            }
        }
    }
}
