//! Record lifecycle hooks.
//!
//! [`MobileAppService::create`] persists a record and then runs every
//! registered observer in order, on the caller's task. The
//! [`ProvisioningTrigger`] observer is what queues the branch setup.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{MobileApp, NewMobileApp};
use crate::queue::{JobQueue, ProvisionJob, QueueError};
use crate::store::{MobileAppStore, StoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not enqueue provisioning: {0}")]
    Queue(#[from] QueueError),

    #[error("mobile app {0} not found")]
    NotFound(i64),

    #[error("mobile app {app_id} is already provisioned with branch '{branch}'")]
    AlreadyProvisioned { app_id: i64, branch: String },
}

#[async_trait]
pub trait MobileAppObserver: Send + Sync {
    /// Called once, right after the record has been stored
    async fn created(&self, app: &MobileApp) -> Result<(), ServiceError>;
}

/// Queues one provisioning job per created app
pub struct ProvisioningTrigger {
    queue: Arc<dyn JobQueue>,
}

impl ProvisioningTrigger {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }

    pub async fn dispatch(&self, app: &MobileApp) -> Result<Uuid, ServiceError> {
        let job_id = self.queue.dispatch(ProvisionJob::new(app.clone())).await?;
        info!(app.id = app.id, job.id = %job_id, "Provisioning queued");
        Ok(job_id)
    }
}

#[async_trait]
impl MobileAppObserver for ProvisioningTrigger {
    async fn created(&self, app: &MobileApp) -> Result<(), ServiceError> {
        self.dispatch(app).await.map(|_| ())
    }
}

pub struct MobileAppService {
    store: Arc<dyn MobileAppStore>,
    observers: Vec<Arc<dyn MobileAppObserver>>,
}

impl MobileAppService {
    pub fn new(store: Arc<dyn MobileAppStore>) -> Self {
        Self {
            store,
            observers: Vec::new(),
        }
    }

    pub fn observe(mut self, observer: Arc<dyn MobileAppObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn MobileAppStore> {
        &self.store
    }

    /// Store the record, then notify observers. The first observer error is
    /// returned as is; the record stays stored either way.
    pub async fn create(&self, app: NewMobileApp) -> Result<MobileApp, ServiceError> {
        let app = self.store.create(app).await?;
        info!(app.id = app.id, owner.id = app.owner_id, "Mobile app created");

        for observer in &self.observers {
            observer.created(&app).await?;
        }

        Ok(app)
    }

    pub async fn find(&self, id: i64) -> Result<MobileApp, ServiceError> {
        self.store.find(id).await?.ok_or(ServiceError::NotFound(id))
    }

    pub async fn pending(&self) -> Result<Vec<MobileApp>, ServiceError> {
        Ok(self.store.list_unprovisioned().await?)
    }

    /// Queue provisioning again for an app that never got a branch
    pub async fn reprovision(
        &self,
        id: i64,
        trigger: &ProvisioningTrigger,
    ) -> Result<Uuid, ServiceError> {
        let app = self.find(id).await?;
        if let Some(branch) = app.branch {
            return Err(ServiceError::AlreadyProvisioned { app_id: id, branch });
        }
        trigger.dispatch(&app).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MockJobQueue;
    use crate::store::InMemoryStore;
    use tokio::sync::Mutex;

    fn new_app() -> NewMobileApp {
        NewMobileApp::new(5, "Camera", "com.example.camera")
    }

    #[tokio::test]
    async fn test_create_enqueues_exactly_one_job() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_dispatch()
            .withf(|job| job.app.name == "Camera" && job.app.branch.is_none())
            .times(1)
            .returning(|_| Ok(Uuid::nil()));

        let store = Arc::new(InMemoryStore::new());
        let service = MobileAppService::new(store.clone())
            .observe(Arc::new(ProvisioningTrigger::new(Arc::new(queue))));

        let app = service.create(new_app()).await.unwrap();
        assert_eq!(app.owner_id, 5);
        assert!(store.find(app.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_enqueue_failure_propagates_and_record_remains() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(QueueError::Full { capacity: 1 }));

        let store = Arc::new(InMemoryStore::new());
        let service = MobileAppService::new(store.clone())
            .observe(Arc::new(ProvisioningTrigger::new(Arc::new(queue))));

        let err = service.create(new_app()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Queue(QueueError::Full { .. })));

        let pending = store.list_unprovisioned().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].branch.is_none());
    }

    struct Recorder {
        label: &'static str,
        seen: Arc<Mutex<Vec<(&'static str, i64)>>>,
    }

    #[async_trait]
    impl MobileAppObserver for Recorder {
        async fn created(&self, app: &MobileApp) -> Result<(), ServiceError> {
            self.seen.lock().await.push((self.label, app.id));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_observers_run_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let service = MobileAppService::new(Arc::new(InMemoryStore::new()))
            .observe(Arc::new(Recorder {
                label: "first",
                seen: seen.clone(),
            }))
            .observe(Arc::new(Recorder {
                label: "second",
                seen: seen.clone(),
            }));

        let app = service.create(new_app()).await.unwrap();
        assert_eq!(*seen.lock().await, vec![("first", app.id), ("second", app.id)]);
    }

    #[tokio::test]
    async fn test_reprovision_refuses_provisioned_app() {
        let store = Arc::new(InMemoryStore::new());
        let service = MobileAppService::new(store.clone());
        let app = service.create(new_app()).await.unwrap();
        store.assign_branch(app.id, "abc").await.unwrap();

        let trigger = ProvisioningTrigger::new(Arc::new(MockJobQueue::new()));
        let err = service.reprovision(app.id, &trigger).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyProvisioned { .. }));
    }

    #[tokio::test]
    async fn test_reprovision_dispatches_for_pending_app() {
        let mut queue = MockJobQueue::new();
        queue
            .expect_dispatch()
            .times(1)
            .returning(|_| Ok(Uuid::from_u128(7)));

        let service = MobileAppService::new(Arc::new(InMemoryStore::new()));
        let app = service.create(new_app()).await.unwrap();

        let trigger = ProvisioningTrigger::new(Arc::new(queue));
        let job_id = service.reprovision(app.id, &trigger).await.unwrap();
        assert_eq!(job_id, Uuid::from_u128(7));
    }

    #[tokio::test]
    async fn test_reprovision_unknown_app() {
        let service = MobileAppService::new(Arc::new(InMemoryStore::new()));
        let trigger = ProvisioningTrigger::new(Arc::new(MockJobQueue::new()));
        assert!(matches!(
            service.reprovision(99, &trigger).await,
            Err(ServiceError::NotFound(99))
        ));
    }
}
