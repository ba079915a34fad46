use async_trait::async_trait;
use chrono::Utc;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, SqlitePool};
use std::path::PathBuf;
use tracing::info;

use super::{MobileAppStore, StoreError};
use crate::config::DatabaseConfig;
use crate::models::{MobileApp, NewMobileApp};

const COLUMNS: &str = "id, owner_id, name, package, version, branch, created_at, updated_at";

/// SQLite-backed store for mobile app records
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect, creating the database file and running migrations if configured
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        if let Some(file) = database_file(&config.url) {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Directory {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            if !sqlx::Sqlite::database_exists(&config.url).await? {
                info!("Creating database at {}", config.url);
                sqlx::Sqlite::create_database(&config.url).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;

        if config.auto_migrate {
            info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        Ok(Self { pool })
    }
}

/// File behind a `sqlite:` URL, `None` for in-memory databases
fn database_file(url: &str) -> Option<PathBuf> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty()).then(|| PathBuf::from(path))
}

#[async_trait]
impl MobileAppStore for SqliteStore {
    async fn create(&self, app: NewMobileApp) -> Result<MobileApp, StoreError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, MobileApp>(&format!(
            r#"
            INSERT INTO mobile_apps (owner_id, name, package, version, branch, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(app.owner_id)
        .bind(&app.name)
        .bind(&app.package)
        .bind(&app.version)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find(&self, id: i64) -> Result<Option<MobileApp>, StoreError> {
        let record = sqlx::query_as::<_, MobileApp>(&format!(
            "SELECT {COLUMNS} FROM mobile_apps WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save(&self, app: &MobileApp) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE mobile_apps
            SET owner_id = ?1, name = ?2, package = ?3, version = ?4, branch = ?5, updated_at = ?6
            WHERE id = ?7
            "#,
        )
        .bind(app.owner_id)
        .bind(&app.name)
        .bind(&app.package)
        .bind(&app.version)
        .bind(&app.branch)
        .bind(Utc::now())
        .bind(app.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(app.id));
        }
        Ok(())
    }

    async fn assign_branch(&self, id: i64, branch: &str) -> Result<MobileApp, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE mobile_apps
            SET branch = ?1, updated_at = ?2
            WHERE id = ?3 AND (branch IS NULL OR branch = ?1)
            "#,
        )
        .bind(branch)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let current = self.find(id).await?.ok_or(StoreError::NotFound(id))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::BranchAlreadyAssigned {
                id,
                existing: current.branch.unwrap_or_default(),
                requested: branch.to_string(),
            });
        }
        Ok(current)
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM mobile_apps WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_unprovisioned(&self) -> Result<Vec<MobileApp>, StoreError> {
        let records = sqlx::query_as::<_, MobileApp>(&format!(
            "SELECT {COLUMNS} FROM mobile_apps WHERE branch IS NULL ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
