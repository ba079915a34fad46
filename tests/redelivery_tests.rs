/// At-least-once delivery: what happens when the same job runs twice
use std::sync::Arc;

mod fixtures;
use fixtures::*;

use mobile_provisioner::config::ProvisioningConfig;
use mobile_provisioner::{InMemoryStore, MobileAppStore, ProvisionOutcome};

#[tokio::test]
async fn test_legacy_duplicate_delivery_creates_two_branches() {
    let template = TemplateRepo::new();
    let store = Arc::new(InMemoryStore::new());
    let app = create_app(&store, "Twice").await;
    let job = job_for(&app);

    let worker = template.worker(store.clone(), ProvisioningConfig::legacy());
    let first = worker.provision(&job).await.unwrap();
    let second = worker.provision(&job).await.unwrap();

    assert_ne!(first.branch(), second.branch());

    let mut expected = vec![first.branch().to_string(), second.branch().to_string()];
    expected.sort();
    assert_eq!(template.provisioned_branches(), expected);

    // Last save wins: only the second branch is recorded
    let stored = store.find(app.id).await.unwrap().unwrap();
    assert_eq!(stored.branch.as_deref(), Some(second.branch()));
}

#[tokio::test]
async fn test_hardened_duplicate_delivery_is_a_no_op() {
    let template = TemplateRepo::new();
    let store = Arc::new(InMemoryStore::new());
    let app = create_app(&store, "Twice").await;
    let job = job_for(&app);

    let worker = template.worker(store.clone(), ProvisioningConfig::default());
    let first = worker.provision(&job).await.unwrap();
    let recorded = store.find(app.id).await.unwrap().unwrap();

    let second = worker.provision(&job).await.unwrap();

    assert!(matches!(first, ProvisionOutcome::Provisioned { .. }));
    assert_eq!(
        second,
        ProvisionOutcome::AlreadyProvisioned {
            app_id: app.id,
            branch: first.branch().to_string(),
        }
    );
    assert_eq!(template.provisioned_branches(), vec![first.branch().to_string()]);
    assert_eq!(store.find(app.id).await.unwrap().unwrap(), recorded);
}

#[tokio::test]
async fn test_stale_snapshot_is_ignored_when_refetching() {
    let template = TemplateRepo::new();
    let store = Arc::new(InMemoryStore::new());
    let app = create_app(&store, "Renamed").await;
    let job = job_for(&app);

    // Provisioned by an earlier delivery after this snapshot was taken
    store.assign_branch(app.id, "AlreadyChosenBranch01").await.unwrap();

    let worker = template.worker(store.clone(), ProvisioningConfig::default());
    let outcome = worker.provision(&job).await.unwrap();

    assert_eq!(outcome.branch(), "AlreadyChosenBranch01");
    assert_eq!(
        template.provisioned_branches(),
        vec!["AlreadyChosenBranch01".to_string()]
    );
}
