//! Persistence for [`MobileApp`] records.
//!
//! The store is a collaborator of the provisioning workflow: it creates
//! records, hands them back by id, and accepts the branch name once the
//! worker has created it.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{MobileApp, NewMobileApp};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("mobile app {0} not found")]
    NotFound(i64),

    #[error("mobile app {id} already has branch '{existing}', refusing to assign '{requested}'")]
    BranchAlreadyAssigned {
        id: i64,
        existing: String,
        requested: String,
    },

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[cfg(feature = "database")]
    #[error("could not create database directory {}: {source}", path.display())]
    Directory {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MobileAppStore: Send + Sync {
    /// Persist a new record and return it with its assigned id
    async fn create(&self, app: NewMobileApp) -> Result<MobileApp, StoreError>;

    async fn find(&self, id: i64) -> Result<Option<MobileApp>, StoreError>;

    /// Write the whole record back. Last writer wins.
    async fn save(&self, app: &MobileApp) -> Result<(), StoreError>;

    /// Set the branch if it is still null (or already equal).
    async fn assign_branch(&self, id: i64, branch: &str) -> Result<MobileApp, StoreError>;

    /// Remove the record. Any branch already pushed stays on the remote.
    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Records still waiting for a branch, oldest first
    async fn list_unprovisioned(&self) -> Result<Vec<MobileApp>, StoreError>;
}
