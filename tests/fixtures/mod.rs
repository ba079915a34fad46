//! Shared fixtures: a template repository on disk with a bare `origin`.
#![allow(dead_code)]

use git2::{build::RepoBuilder, BranchType, Oid, Repository, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use mobile_provisioner::config::{ProvisioningConfig, RepositoryConfig};
use mobile_provisioner::{
    InMemoryStore, MobileApp, MobileAppStore, NewMobileApp, ProvisionJob, ProvisioningWorker,
    QueuedJob,
};

/// Seed commit pushed to a bare remote, plus a working copy cloned from it
pub struct TemplateRepo {
    dir: TempDir,
    pub remote: PathBuf,
    pub working_copy: PathBuf,
    pub workspace_root: PathBuf,
    pub default_branch: String,
}

impl TemplateRepo {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();

        let seed = dir.path().join("seed");
        let repo = Repository::init(&seed).unwrap();
        fs::write(seed.join("README.md"), "# Mobile app template\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::now("Template", "template@example.com").unwrap();
        repo.commit(Some("HEAD"), &signature, &signature, "Initial template", &tree, &[])
            .unwrap();

        let remote = dir.path().join("remote.git");
        RepoBuilder::new()
            .bare(true)
            .clone(seed.to_str().unwrap(), &remote)
            .unwrap();

        let working_copy = dir.path().join("working-copy");
        let clone = Repository::clone(remote.to_str().unwrap(), &working_copy).unwrap();
        let default_branch = clone.head().unwrap().shorthand().unwrap().to_string();

        let workspace_root = dir.path().join("workspaces");

        Self {
            dir,
            remote,
            working_copy,
            workspace_root,
            default_branch,
        }
    }

    pub fn repository_config(&self) -> RepositoryConfig {
        RepositoryConfig {
            working_copy: self.working_copy.clone(),
            ..RepositoryConfig::default()
        }
    }

    /// Point a provisioning profile at this fixture's workspace root
    pub fn provisioning_config(&self, base: ProvisioningConfig) -> ProvisioningConfig {
        ProvisioningConfig {
            workspace_root: self.workspace_root.clone(),
            ..base
        }
    }

    pub fn worker(
        &self,
        store: Arc<dyn MobileAppStore>,
        profile: ProvisioningConfig,
    ) -> ProvisioningWorker {
        ProvisioningWorker::new(
            store,
            &self.repository_config(),
            &self.provisioning_config(profile),
        )
    }

    pub fn remote_repo(&self) -> Repository {
        Repository::open_bare(&self.remote).unwrap()
    }

    pub fn remote_branches(&self) -> Vec<String> {
        let repo = self.remote_repo();
        let mut names: Vec<String> = repo
            .branches(Some(BranchType::Local))
            .unwrap()
            .map(|b| b.unwrap().0.name().unwrap().unwrap().to_string())
            .collect();
        names.sort();
        names
    }

    /// Branches on the remote other than the template's default branch
    pub fn provisioned_branches(&self) -> Vec<String> {
        self.remote_branches()
            .into_iter()
            .filter(|name| name != &self.default_branch)
            .collect()
    }

    pub fn remote_tip(&self, branch: &str) -> Oid {
        let repo = self.remote_repo();
        let tip = repo
            .find_branch(branch, BranchType::Local)
            .unwrap()
            .get()
            .target()
            .unwrap();
        tip
    }

    pub fn remote_commit_message(&self, branch: &str) -> String {
        let repo = self.remote_repo();
        let commit = repo.find_commit(self.remote_tip(branch)).unwrap();
        commit.message().unwrap().to_string()
    }

    pub fn remote_parent(&self, branch: &str) -> Oid {
        let repo = self.remote_repo();
        let commit = repo.find_commit(self.remote_tip(branch)).unwrap();
        commit.parent_id(0).unwrap()
    }

    pub fn remote_file(&self, branch: &str, path: &str) -> Option<String> {
        let repo = self.remote_repo();
        let commit = repo.find_commit(self.remote_tip(branch)).unwrap();
        let tree = commit.tree().unwrap();
        let entry = tree.get_path(Path::new(path)).ok()?;
        let blob = repo.find_blob(entry.id()).unwrap();
        Some(String::from_utf8(blob.content().to_vec()).unwrap())
    }

    pub fn default_head(&self) -> Oid {
        self.remote_tip(&self.default_branch)
    }

    /// Temporarily make the remote unreachable
    pub fn take_remote_offline(&self) -> PathBuf {
        let parked = self.dir.path().join("remote.git.offline");
        fs::rename(&self.remote, &parked).unwrap();
        parked
    }

    pub fn bring_remote_online(&self, parked: &Path) {
        fs::rename(parked, &self.remote).unwrap();
    }
}

pub async fn create_app(store: &InMemoryStore, name: &str) -> MobileApp {
    store
        .create(NewMobileApp::new(1, name, format!("com.example.{}", name.to_lowercase())))
        .await
        .unwrap()
}

pub fn job_for(app: &MobileApp) -> QueuedJob {
    QueuedJob::new(ProvisionJob::new(app.clone()))
}

pub fn is_branch_name(name: &str) -> bool {
    name.len() == 21 && name.chars().all(|c| c.is_ascii_alphanumeric())
}
