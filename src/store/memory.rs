use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{MobileAppStore, StoreError};
use crate::models::{MobileApp, NewMobileApp};

/// Process-local store, used by tests and by the CLI when no database is configured
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    apps: BTreeMap<i64, MobileApp>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.apps.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl MobileAppStore for InMemoryStore {
    async fn create(&self, app: NewMobileApp) -> Result<MobileApp, StoreError> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;

        let now = Utc::now();
        let record = MobileApp {
            id: inner.next_id,
            owner_id: app.owner_id,
            name: app.name,
            package: app.package,
            version: app.version,
            branch: None,
            created_at: now,
            updated_at: now,
        };
        inner.apps.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: i64) -> Result<Option<MobileApp>, StoreError> {
        Ok(self.inner.read().await.apps.get(&id).cloned())
    }

    async fn save(&self, app: &MobileApp) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.apps.get_mut(&app.id).ok_or(StoreError::NotFound(app.id))?;
        *stored = app.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn assign_branch(&self, id: i64, branch: &str) -> Result<MobileApp, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner.apps.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        match stored.branch.as_deref() {
            Some(existing) if existing != branch => Err(StoreError::BranchAlreadyAssigned {
                id,
                existing: existing.to_string(),
                requested: branch.to_string(),
            }),
            Some(_) => Ok(stored.clone()),
            None => {
                stored.branch = Some(branch.to_string());
                stored.updated_at = Utc::now();
                Ok(stored.clone())
            }
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.write().await.apps.remove(&id).is_some())
    }

    async fn list_unprovisioned(&self) -> Result<Vec<MobileApp>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .apps
            .values()
            .filter(|app| app.branch.is_none())
            .cloned()
            .collect())
    }
}
