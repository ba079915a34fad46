use anyhow::{bail, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for the provisioner
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisionerConfig {
    /// Template repository the branches are created in
    pub repository: RepositoryConfig,
    /// How provisioning tasks use the repository
    pub provisioning: ProvisioningConfig,
    /// In-process queue and worker pool
    pub queue: QueueConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional, needs the `database` feature)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepositoryConfig {
    /// Local working copy of the template repository
    pub working_copy: PathBuf,
    /// Remote that new branches are pushed to
    pub remote: String,
    /// Content of the marker file committed on every new branch
    pub marker_content: String,
    /// Length of generated branch names
    pub branch_name_length: usize,
    /// Commit author used when the repository has no user configured
    pub author_name: String,
    pub author_email: String,
    /// SSH private key for pushing (defaults to ~/.ssh/id_rsa)
    pub ssh_key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceStrategy {
    /// Every task works directly in `repository.working_copy`
    Shared,
    /// Every task clones the remote into its own directory under `workspace_root`
    Isolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchNaming {
    /// Fresh random name on every run
    Random,
    /// Name derived from the app id, stable across redeliveries
    Deterministic,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvisioningConfig {
    pub workspace: WorkspaceStrategy,
    /// Parent directory for isolated clones
    pub workspace_root: PathBuf,
    pub branch_naming: BranchNaming,
    /// Re-read the record by id when the task runs instead of trusting the queued snapshot
    pub refetch_record: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Maximum queued jobs before dispatch is refused
    pub capacity: usize,
    /// Deliveries per job before it is recorded as failed
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (overridden by RUST_LOG)
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            working_copy: PathBuf::from("storage/template-repo"),
            remote: "origin".to_string(),
            marker_content: "Branch is working".to_string(),
            branch_name_length: 21,
            author_name: "Mobile Provisioner".to_string(),
            author_email: "provisioner@localhost".to_string(),
            ssh_key_path: None,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceStrategy::Isolated,
            workspace_root: std::env::temp_dir().join("mobile-provisioner"),
            branch_naming: BranchNaming::Deterministic,
            refetch_record: true,
        }
    }
}

impl ProvisioningConfig {
    /// Shared working copy, random names, queued snapshot: the original
    /// behaviour, with its checkout race and non-idempotent redelivery.
    pub fn legacy() -> Self {
        Self {
            workspace: WorkspaceStrategy::Shared,
            branch_naming: BranchNaming::Random,
            refetch_record: false,
            ..Self::default()
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 256,
            max_attempts: 3,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            repository: RepositoryConfig::default(),
            provisioning: ProvisioningConfig::default(),
            queue: QueueConfig::default(),
            observability: ObservabilityConfig::default(),
            database: Some(DatabaseConfig {
                url: "sqlite://storage/mobile-provisioner.db".to_string(),
                max_connections: 5,
                auto_migrate: true,
            }),
        }
    }
}

impl ProvisionerConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. mobile-provisioner.toml in the working directory
    /// 3. An explicit file, if given
    /// 4. Environment variables (MOBILE_PROVISIONER__SECTION__KEY)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("mobile-provisioner.toml").exists() {
            builder = builder.add_source(File::with_name("mobile-provisioner"));
        }

        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("MOBILE_PROVISIONER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ProvisionerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue.workers == 0 {
            bail!("queue.workers must be at least 1");
        }
        if self.queue.capacity == 0 {
            bail!("queue.capacity must be at least 1");
        }
        if self.queue.max_attempts == 0 {
            bail!("queue.max_attempts must be at least 1");
        }
        if self.repository.branch_name_length == 0 || self.repository.branch_name_length > 64 {
            bail!(
                "repository.branch_name_length must be between 1 and 64, got {}",
                self.repository.branch_name_length
            );
        }
        if self.repository.remote.trim().is_empty() {
            bail!("repository.remote must not be empty");
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<ProvisionerConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = ProvisionerConfig::load_env_file();
        ProvisionerConfig::load(None)
    });

/// Get the global configuration
pub fn config() -> Result<&'static ProvisionerConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
