use async_trait::async_trait;
use git2::Oid;
use std::sync::Arc;
use tracing::{debug, info};

use super::branch_name::{deterministic_branch_name, random_branch_name};
use super::{
    marker_file_name, ProvisionOutcome, ProvisioningError, ProvisioningStep, WorkspaceProvider,
};
use crate::config::{BranchNaming, ProvisioningConfig, RepositoryConfig};
use crate::git::GitOperations;
use crate::observability::OperationTimer;
use crate::queue::{JobHandler, QueuedJob};
use crate::store::MobileAppStore;

/// Handles provisioning jobs pulled from the queue
pub struct ProvisioningWorker {
    store: Arc<dyn MobileAppStore>,
    workspaces: WorkspaceProvider,
    remote: String,
    marker_content: String,
    branch_name_length: usize,
    naming: BranchNaming,
    refetch_record: bool,
}

impl ProvisioningWorker {
    pub fn new(
        store: Arc<dyn MobileAppStore>,
        repository: &RepositoryConfig,
        provisioning: &ProvisioningConfig,
    ) -> Self {
        Self {
            store,
            workspaces: WorkspaceProvider::new(repository, provisioning),
            remote: repository.remote.clone(),
            marker_content: repository.marker_content.clone(),
            branch_name_length: repository.branch_name_length,
            naming: provisioning.branch_naming,
            refetch_record: provisioning.refetch_record,
        }
    }

    pub async fn provision(&self, job: &QueuedJob) -> Result<ProvisionOutcome, ProvisioningError> {
        let app_id = job.job.app_id();

        let mut app = if self.refetch_record {
            self.store
                .find(app_id)
                .await
                .map_err(|e| ProvisioningError::store(ProvisioningStep::LoadRecord, e))?
                .ok_or(ProvisioningError::RecordNotFound { app_id })?
        } else {
            job.job.app.clone()
        };

        // A branch on the fresh record means an earlier delivery got past
        // step 4; finish that branch instead of starting another one.
        let recorded = if self.refetch_record { app.branch.clone() } else { None };
        let reuse_existing = recorded.is_some() || self.naming == BranchNaming::Deterministic;

        let workspaces = self.workspaces.clone();
        let remote = self.remote.clone();
        let naming = self.naming;
        let length = self.branch_name_length;
        let job_id = job.id;

        let (workspace, ops, branch) = tokio::task::spawn_blocking(move || {
            let timer = OperationTimer::new("open_repository");
            let (workspace, ops) = workspaces.acquire(job_id)?;
            timer.finish();

            let branch = recorded.unwrap_or_else(|| match naming {
                BranchNaming::Random => random_branch_name(length),
                BranchNaming::Deterministic => deterministic_branch_name(app_id, length),
            });

            let timer = OperationTimer::new("create_branch");
            check_out_branch(&ops, &branch, &remote, reuse_existing)
                .map_err(|e| ProvisioningError::git(ProvisioningStep::CreateBranch, e))?;
            timer.finish();

            Ok::<_, ProvisioningError>((workspace, ops, branch))
        })
        .await??;

        if self.refetch_record {
            self.store
                .assign_branch(app_id, &branch)
                .await
                .map_err(|e| ProvisioningError::store(ProvisioningStep::PersistBranch, e))?;
        } else {
            app.branch = Some(branch.clone());
            self.store
                .save(&app)
                .await
                .map_err(|e| ProvisioningError::store(ProvisioningStep::PersistBranch, e))?;
        }
        debug!(branch = %branch, "Branch recorded on app");

        let remote = self.remote.clone();
        let marker_content = self.marker_content.clone();
        let pushed_branch = branch.clone();
        let published = tokio::task::spawn_blocking(move || {
            let result = write_commit_push(&ops, &pushed_branch, &marker_content, &remote);
            drop(ops);
            drop(workspace);
            result
        })
        .await??;

        Ok(match published {
            Some(oid) => {
                info!(app.id = app_id, branch = %branch, commit = %oid, "Branch provisioned");
                ProvisionOutcome::Provisioned {
                    app_id,
                    branch,
                    commit: oid.to_string(),
                }
            }
            None => {
                info!(app.id = app_id, branch = %branch, "Branch already on remote");
                ProvisionOutcome::AlreadyProvisioned { app_id, branch }
            }
        })
    }
}

#[async_trait]
impl JobHandler for ProvisioningWorker {
    async fn handle(&self, job: &QueuedJob) -> Result<ProvisionOutcome, ProvisioningError> {
        self.provision(job).await
    }
}

/// Create and check out `branch`, or check out the existing one when reuse is allowed.
///
/// New branches start from whatever HEAD the workspace currently has.
fn check_out_branch(
    ops: &impl GitOperations,
    branch: &str,
    remote: &str,
    reuse_existing: bool,
) -> anyhow::Result<()> {
    if reuse_existing && ops.branch_exists(branch)? {
        debug!(branch, "Reusing existing local branch");
        return ops.checkout_branch(branch);
    }

    let from = if reuse_existing && ops.remote_branch_exists(remote, branch)? {
        format!("{remote}/{branch}")
    } else {
        "HEAD".to_string()
    };
    debug!(
        branch,
        from = %from,
        base = ?ops.current_branch().ok().flatten(),
        "Creating branch"
    );

    ops.create_branch(branch, &from)?;
    ops.checkout_branch(branch)
}

/// Write the marker, commit it with the branch name as message, push with upstream.
///
/// Returns the branch tip when this run changed the remote branch, `None`
/// when the remote already had it.
fn write_commit_push(
    ops: &impl GitOperations,
    branch: &str,
    marker_content: &str,
    remote: &str,
) -> Result<Option<Oid>, ProvisioningError> {
    let workdir = ops
        .workdir()
        .map_err(|e| ProvisioningError::git(ProvisioningStep::WriteMarker, e))?;
    let marker = marker_file_name(branch);
    let path = workdir.join(&marker);
    std::fs::write(&path, marker_content)
        .map_err(|source| ProvisioningError::Io { path, source })?;

    let timer = OperationTimer::new("commit");
    let commit = ops
        .add_and_commit(&[marker.as_path()], branch)
        .map_err(|e| ProvisioningError::git(ProvisioningStep::Commit, e))?;
    timer.finish();

    let timer = OperationTimer::new("push");
    let moved = ops
        .push(remote, branch, true)
        .map_err(|e| ProvisioningError::git(ProvisioningStep::Push, e))?;
    timer.finish();

    if !moved {
        return Ok(None);
    }
    match commit {
        Some(oid) => Ok(Some(oid)),
        // Committed by an earlier delivery whose push failed
        None => ops
            .head_commit()
            .map(Some)
            .map_err(|e| ProvisioningError::git(ProvisioningStep::Push, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::ProvisionJob;
    use crate::store::MockMobileAppStore;
    use crate::test_support::sample_app;
    use anyhow::{anyhow, Result};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum GitCall {
        CreateBranch { name: String, from: String },
        Checkout(String),
        Commit { paths: Vec<PathBuf>, message: String },
        Push { remote: String, branch: String, set_upstream: bool },
    }

    /// Records calls; no repository behind it
    struct RecordingGit {
        workdir: PathBuf,
        local: HashSet<String>,
        remote: HashSet<String>,
        fail_push: bool,
        /// Whether `add_and_commit` finds anything to commit
        tree_changed: bool,
        /// Whether `push` moves the remote ref
        remote_moves: bool,
        calls: RefCell<Vec<GitCall>>,
    }

    impl RecordingGit {
        fn new(workdir: PathBuf) -> Self {
            Self {
                workdir,
                local: HashSet::new(),
                remote: HashSet::new(),
                fail_push: false,
                tree_changed: true,
                remote_moves: true,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<GitCall> {
            self.calls.borrow().clone()
        }
    }

    impl GitOperations for RecordingGit {
        fn workdir(&self) -> Result<PathBuf> {
            Ok(self.workdir.clone())
        }

        fn current_branch(&self) -> Result<Option<String>> {
            Ok(Some("main".to_string()))
        }

        fn head_commit(&self) -> Result<Oid> {
            Ok(Oid::from_str("1111111111111111111111111111111111111111")?)
        }

        fn create_branch(&self, name: &str, from: &str) -> Result<()> {
            self.calls.borrow_mut().push(GitCall::CreateBranch {
                name: name.to_string(),
                from: from.to_string(),
            });
            Ok(())
        }

        fn checkout_branch(&self, branch: &str) -> Result<()> {
            self.calls.borrow_mut().push(GitCall::Checkout(branch.to_string()));
            Ok(())
        }

        fn branch_exists(&self, branch: &str) -> Result<bool> {
            Ok(self.local.contains(branch))
        }

        fn remote_branch_exists(&self, _remote: &str, branch: &str) -> Result<bool> {
            Ok(self.remote.contains(branch))
        }

        fn remote_url(&self, _remote: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn add_and_commit(&self, paths: &[&Path], message: &str) -> Result<Option<Oid>> {
            self.calls.borrow_mut().push(GitCall::Commit {
                paths: paths.iter().map(|p| p.to_path_buf()).collect(),
                message: message.to_string(),
            });
            Ok(self.tree_changed.then(Oid::zero))
        }

        fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<bool> {
            self.calls.borrow_mut().push(GitCall::Push {
                remote: remote.to_string(),
                branch: branch.to_string(),
                set_upstream,
            });
            if self.fail_push {
                return Err(anyhow!("remote end hung up unexpectedly"));
            }
            Ok(self.remote_moves)
        }

        fn upstream_of(&self, _branch: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_new_branch_starts_from_head() {
        let git = RecordingGit::new(PathBuf::from("/unused"));
        check_out_branch(&git, "abc", "origin", false).unwrap();

        assert_eq!(
            git.calls(),
            vec![
                GitCall::CreateBranch {
                    name: "abc".to_string(),
                    from: "HEAD".to_string()
                },
                GitCall::Checkout("abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_existing_local_branch_is_reused() {
        let mut git = RecordingGit::new(PathBuf::from("/unused"));
        git.local.insert("abc".to_string());
        check_out_branch(&git, "abc", "origin", true).unwrap();

        assert_eq!(git.calls(), vec![GitCall::Checkout("abc".to_string())]);
    }

    #[test]
    fn test_remote_branch_is_tracked_when_reused() {
        let mut git = RecordingGit::new(PathBuf::from("/unused"));
        git.remote.insert("abc".to_string());
        check_out_branch(&git, "abc", "origin", true).unwrap();

        assert_eq!(
            git.calls()[0],
            GitCall::CreateBranch {
                name: "abc".to_string(),
                from: "origin/abc".to_string()
            }
        );
    }

    #[test]
    fn test_write_commit_push_sequence() {
        let dir = TempDir::new().unwrap();
        let git = RecordingGit::new(dir.path().to_path_buf());

        write_commit_push(&git, "abc", "Branch is working", "origin").unwrap();

        let content = std::fs::read_to_string(dir.path().join("abc.txt")).unwrap();
        assert_eq!(content, "Branch is working");
        assert_eq!(
            git.calls(),
            vec![
                GitCall::Commit {
                    paths: vec![PathBuf::from("abc.txt")],
                    message: "abc".to_string()
                },
                GitCall::Push {
                    remote: "origin".to_string(),
                    branch: "abc".to_string(),
                    set_upstream: true
                },
            ]
        );
    }

    #[test]
    fn test_first_successful_push_after_earlier_commit_counts_as_provisioned() {
        let dir = TempDir::new().unwrap();
        let mut git = RecordingGit::new(dir.path().to_path_buf());
        git.tree_changed = false;

        let published = write_commit_push(&git, "abc", "Branch is working", "origin").unwrap();
        assert_eq!(
            published,
            Some(Oid::from_str("1111111111111111111111111111111111111111").unwrap())
        );
    }

    #[test]
    fn test_nothing_published_when_remote_is_current() {
        let dir = TempDir::new().unwrap();
        let mut git = RecordingGit::new(dir.path().to_path_buf());
        git.tree_changed = false;
        git.remote_moves = false;

        let published = write_commit_push(&git, "abc", "Branch is working", "origin").unwrap();
        assert_eq!(published, None);
    }

    #[test]
    fn test_push_failure_is_tagged_with_step() {
        let dir = TempDir::new().unwrap();
        let mut git = RecordingGit::new(dir.path().to_path_buf());
        git.fail_push = true;

        let err = write_commit_push(&git, "abc", "Branch is working", "origin").unwrap_err();
        assert_eq!(err.step(), Some(ProvisioningStep::Push));
        // Nothing is rolled back: the marker stays in the working copy
        assert!(dir.path().join("abc.txt").exists());
    }

    #[test]
    fn test_marker_write_failure() {
        let git = RecordingGit::new(PathBuf::from("/nonexistent/workdir/for/tests"));
        let err = write_commit_push(&git, "abc", "Branch is working", "origin").unwrap_err();
        assert!(matches!(err, ProvisioningError::Io { .. }));
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_record_is_reported() {
        let mut store = MockMobileAppStore::new();
        store.expect_find().times(1).returning(|_| Ok(None));
        store.expect_assign_branch().never();

        let worker = ProvisioningWorker::new(
            Arc::new(store),
            &RepositoryConfig::default(),
            &ProvisioningConfig::default(),
        );
        let job = QueuedJob::new(ProvisionJob::new(sample_app(3)));

        let err = worker.provision(&job).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::RecordNotFound { app_id: 3 }));
    }

    #[tokio::test]
    async fn test_missing_working_copy_fails_before_persisting() {
        let mut store = MockMobileAppStore::new();
        store.expect_find().never();
        store.expect_save().never();

        let repository = RepositoryConfig {
            working_copy: PathBuf::from("/nonexistent/template-repo"),
            ..RepositoryConfig::default()
        };
        let worker =
            ProvisioningWorker::new(Arc::new(store), &repository, &ProvisioningConfig::legacy());
        let job = QueuedJob::new(ProvisionJob::new(sample_app(4)));

        let err = worker.provision(&job).await.unwrap_err();
        assert_eq!(err.step(), Some(ProvisioningStep::OpenRepository));
    }
}
