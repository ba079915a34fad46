use anyhow::{bail, Context, Result};
use git2::{
    build::RepoBuilder, BranchType, CredentialType, Cred, ErrorCode, FetchOptions, Oid,
    PushOptions, RemoteCallbacks, Repository, Signature,
};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

/// Trait defining the git operations provisioning relies on
pub trait GitOperations {
    /// Root of the working tree
    fn workdir(&self) -> Result<PathBuf>;

    /// Short name of the checked-out branch, `None` when HEAD is detached or unborn
    fn current_branch(&self) -> Result<Option<String>>;

    /// Commit HEAD points at
    fn head_commit(&self) -> Result<Oid>;

    /// Create a new branch (replaces `git branch <name> <from>`)
    fn create_branch(&self, name: &str, from: &str) -> Result<()>;

    /// Checkout a local branch (replaces `git checkout`)
    fn checkout_branch(&self, branch: &str) -> Result<()>;

    /// Check if branch exists locally (replaces `git branch --list`)
    fn branch_exists(&self, branch: &str) -> Result<bool>;

    /// Check if a remote-tracking branch exists
    fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool>;

    /// URL configured for a remote
    fn remote_url(&self, remote: &str) -> Result<Option<String>>;

    /// Stage paths (relative to the workdir) and commit them on HEAD.
    ///
    /// Returns `None` without committing when the staged tree equals HEAD's.
    fn add_and_commit(&self, paths: &[&Path], message: &str) -> Result<Option<Oid>>;

    /// Push a local branch (replaces `git push [-u] <remote> <branch>`).
    ///
    /// Returns `true` when the remote ref was created or moved, `false` when
    /// it already pointed at the pushed commit.
    fn push(&self, remote: &str, branch: &str, set_upstream: bool) -> Result<bool>;

    /// Configured upstream of a local branch as `remote/branch`
    fn upstream_of(&self, branch: &str) -> Result<Option<String>>;
}

/// Credentials used for network operations
#[derive(Debug, Clone, Default)]
pub struct PushAuth {
    /// Private key for SSH remotes; `~/.ssh/id_rsa` when unset
    pub ssh_key_path: Option<PathBuf>,
}

impl PushAuth {
    fn ssh_key(&self) -> PathBuf {
        self.ssh_key_path.clone().unwrap_or_else(|| {
            PathBuf::from(std::env::var("HOME").unwrap_or_default()).join(".ssh/id_rsa")
        })
    }

    fn callbacks<'a>(&self) -> RemoteCallbacks<'a> {
        let ssh_key = self.ssh_key();
        let mut attempts = 0u8;

        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |url, username_from_url, allowed_types| {
            // libgit2 keeps asking while credentials are rejected
            attempts += 1;
            if attempts > 3 {
                return Err(git2::Error::from_str("authentication failed after 3 attempts"));
            }

            if allowed_types.contains(CredentialType::SSH_KEY) {
                return Cred::ssh_key(username_from_url.unwrap_or("git"), None, &ssh_key, None);
            }
            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if let Ok(config) = git2::Config::open_default() {
                    return Cred::credential_helper(&config, url, username_from_url);
                }
            }
            Cred::default()
        });
        callbacks
    }
}

/// Implementation of GitOperations using git2
pub struct Git2Operations {
    repo: Repository,
    author_name: String,
    author_email: String,
    auth: PushAuth,
}

impl Git2Operations {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path)
            .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
        Ok(Self::from_repository(repo))
    }

    /// Clone `url` into `into` and open the result
    pub fn clone_into(url: &str, into: &Path, auth: PushAuth) -> Result<Self> {
        let mut fetch_options = FetchOptions::new();
        fetch_options.remote_callbacks(auth.callbacks());

        let repo = RepoBuilder::new()
            .fetch_options(fetch_options)
            .clone(url, into)
            .with_context(|| format!("Failed to clone {url} into {}", into.display()))?;

        Ok(Self::from_repository(repo).with_auth(auth))
    }

    fn from_repository(repo: Repository) -> Self {
        Self {
            repo,
            author_name: "Mobile Provisioner".to_string(),
            author_email: "provisioner@localhost".to_string(),
            auth: PushAuth::default(),
        }
    }

    /// Author used when the repository config has no user
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    pub fn with_auth(mut self, auth: PushAuth) -> Self {
        self.auth = auth;
        self
    }

    fn get_signature(&self) -> Result<Signature<'static>> {
        // Try to get signature from config, fall back to the configured author
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Signature::now(&self.author_name, &self.author_email)
                .context("Failed to create default signature"),
        }
    }
}

impl GitOperations for Git2Operations {
    fn workdir(&self) -> Result<PathBuf> {
        self.repo
            .workdir()
            .map(Path::to_path_buf)
            .context("Repository is bare and has no working directory")
    }

    fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(e).context("Failed to read HEAD"),
        };

        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn head_commit(&self) -> Result<Oid> {
        let commit = self
            .repo
            .head()
            .context("Failed to read HEAD")?
            .peel_to_commit()
            .context("HEAD does not point at a commit")?;
        Ok(commit.id())
    }

    fn create_branch(&self, name: &str, from: &str) -> Result<()> {
        // Find the reference commit
        let from_commit = if from == "HEAD" {
            self.repo.head()?.peel_to_commit()?
        } else if let Ok(branch) = self
            .repo
            .find_branch(from, BranchType::Local)
            .or_else(|_| self.repo.find_branch(from, BranchType::Remote))
        {
            branch.get().peel_to_commit()?
        } else {
            let oid = Oid::from_str(from)
                .map_err(|e| anyhow::anyhow!("Invalid commit or branch '{}': {}", from, e))?;
            self.repo.find_commit(oid)?
        };

        self.repo
            .branch(name, &from_commit, false)
            .with_context(|| format!("Failed to create branch '{name}'"))?;

        Ok(())
    }

    fn checkout_branch(&self, branch: &str) -> Result<()> {
        let branch_ref = self
            .repo
            .find_branch(branch, BranchType::Local)
            .with_context(|| format!("Branch '{branch}' not found"))?;

        let reference = branch_ref.get();
        let refname = reference
            .name()
            .with_context(|| format!("Branch '{branch}' has a non UTF-8 reference name"))?;
        let commit = reference
            .peel_to_commit()
            .context("Branch has no target commit")?;

        // Update working directory, then move HEAD
        self.repo
            .checkout_tree(commit.as_object(), None)
            .with_context(|| format!("Failed to check out tree of '{branch}'"))?;
        self.repo.set_head(refname)?;

        Ok(())
    }

    fn branch_exists(&self, branch: &str) -> Result<bool> {
        match self.repo.find_branch(branch, BranchType::Local) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remote_branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        let remote_branch = format!("{remote}/{branch}");
        match self.repo.find_branch(&remote_branch, BranchType::Remote) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        match self.repo.find_remote(remote) {
            Ok(remote) => Ok(remote.url().map(str::to_string)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn add_and_commit(&self, paths: &[&Path], message: &str) -> Result<Option<Oid>> {
        let mut index = self.repo.index()?;
        for path in paths {
            index
                .add_path(path)
                .with_context(|| format!("Failed to stage {}", path.display()))?;
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let parent = match self.repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e).context("Failed to read HEAD"),
        };

        if let Some(parent) = &parent {
            if parent.tree_id() == tree_id {
                return Ok(None);
            }
        }

        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.get_signature()?;
        let parents: Vec<_> = parent.iter().collect();

        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .context("Failed to create commit")?;

        Ok(Some(oid))
    }

    fn push(&self, remote_name: &str, branch: &str, set_upstream: bool) -> Result<bool> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .with_context(|| format!("Remote '{remote_name}' not found"))?;

        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let target = format!("refs/heads/{branch}");
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        let moved = Cell::new(false);

        {
            let mut callbacks = self.auth.callbacks();
            // src is the remote's current target (zero when the ref is new)
            callbacks.push_negotiation(|updates| {
                for update in updates {
                    if update.dst_refname() == Some(target.as_str()) && update.src() != update.dst() {
                        moved.set(true);
                    }
                }
                Ok(())
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    *rejection.borrow_mut() = Some(format!("{refname}: {message}"));
                }
                Ok(())
            });

            let mut push_options = PushOptions::new();
            push_options.remote_callbacks(callbacks);

            remote
                .push(&[&refspec], Some(&mut push_options))
                .with_context(|| format!("Failed to push '{branch}' to '{remote_name}'"))?;
        }

        if let Some(reason) = rejection.into_inner() {
            bail!("Remote '{remote_name}' rejected '{branch}': {reason}");
        }

        if set_upstream {
            let mut config = self.repo.config()?;
            config.set_str(&format!("branch.{branch}.remote"), remote_name)?;
            config.set_str(
                &format!("branch.{branch}.merge"),
                &format!("refs/heads/{branch}"),
            )?;
        }

        Ok(moved.get())
    }

    fn upstream_of(&self, branch: &str) -> Result<Option<String>> {
        let config = self.repo.config()?.snapshot()?;
        let remote = match config.get_string(&format!("branch.{branch}.remote")) {
            Ok(remote) => remote,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let merge = config.get_string(&format!("branch.{branch}.merge"))?;
        let short = merge.strip_prefix("refs/heads/").unwrap_or(&merge);

        Ok(Some(format!("{remote}/{short}")))
    }
}
