//! Endpoint tests against a real engine with scripted label system.

use serde_json::{json, Map};
use shelfsync_engine::{ExternalError, MockLabelClient, ReconciliationEngine, SyncConfig};
use shelfsync_protocol::{
    AimsCredentials, EntityType, FieldMapping, NewQueueItem, QueueQuery, QueueStatus,
    RemoteArticle, StoreConfig, StoreId, SyncAction, SyncHealth, SyncType, TriggerSyncRequest,
};
use shelfsync_server::{JobRecord, JobState, Principal, Role, ServerConfig, SyncServer};
use shelfsync_store::{FileQueueStore, MemoryEntityStore, MemoryQueueStore, MemoryStoreDirectory, QueueStore};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn aims() -> AimsCredentials {
    AimsCredentials {
        base_url: "https://aims.test".into(),
        company: "ACME".into(),
        api_key: "k".into(),
    }
}

fn build(queue: Arc<dyn QueueStore>) -> (SyncServer<MockLabelClient>, Arc<MockLabelClient>) {
    let directory = Arc::new(MemoryStoreDirectory::new());
    directory.insert(
        StoreConfig::new("s1", "S001")
            .with_aims(aims())
            .with_mapping(FieldMapping::new("code").with_field("code", "code")),
    );
    directory.insert(StoreConfig::new("bare", "B001"));

    let client = Arc::new(MockLabelClient::new());
    let engine = ReconciliationEngine::new(
        SyncConfig::new(),
        queue,
        Arc::new(MemoryEntityStore::new()),
        directory,
        Arc::clone(&client),
    );
    (
        SyncServer::new(ServerConfig::default(), Arc::new(engine)),
        client,
    )
}

fn admin() -> Principal {
    Principal::new("ops", Role::PlatformAdmin)
}

async fn finished(server: &SyncServer<MockLabelClient>, job_id: Uuid) -> JobRecord {
    for _ in 0..400 {
        if server.handle_job(&admin(), job_id).unwrap().state.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    server.handle_job(&admin(), job_id).unwrap()
}

fn article(code: &str) -> RemoteArticle {
    let mut data = Map::new();
    data.insert("code".into(), json!(code));
    RemoteArticle::new(code, data)
}

#[tokio::test]
async fn full_trigger_pulls_then_pushes() {
    let (server, client) = build(Arc::new(MemoryQueueStore::new()));
    client.set_articles("s1", vec![article("A1"), article("A2")]);
    server
        .engine()
        .enqueue(NewQueueItem::new("s1", EntityType::Spaces, "A9", SyncAction::Update, json!({})))
        .unwrap();

    let manager = Principal::new("m", Role::StoreManager).with_store("s1");
    let response = server
        .handle_trigger(&manager, TriggerSyncRequest::new("s1", SyncType::Full))
        .unwrap();
    assert_eq!(response.stats.pending, 1);

    let job = finished(&server, response.job_id).await;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.pull.unwrap().created, 2);
    assert_eq!(job.push.unwrap().succeeded, 1);

    let status = server
        .handle_store_status(&manager, &StoreId::new("s1"))
        .await
        .unwrap();
    assert_eq!(status.queue.completed, 1);
    assert_eq!(status.health, SyncHealth::Idle);
    assert!(status.last_sync_at.is_some());
}

#[tokio::test]
async fn failed_pull_job_still_reports_the_push() {
    let (server, client) = build(Arc::new(MemoryQueueStore::new()));
    client.set_fetch_error(Some(ExternalError::transient("gateway timeout")));
    let id = server
        .engine()
        .enqueue(NewQueueItem::new("s1", EntityType::Spaces, "A9", SyncAction::Update, json!({})))
        .unwrap()
        .item()
        .unwrap()
        .id;

    let response = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Full))
        .unwrap();
    let job = finished(&server, response.job_id).await;

    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.unwrap().contains("gateway timeout"));
    assert_eq!(job.pull.unwrap().total, 0);
    assert_eq!(job.push.unwrap().succeeded, 1);
    assert_eq!(
        server.engine().queue().get(id).unwrap().unwrap().status,
        QueueStatus::Completed
    );
}

#[tokio::test]
async fn unconfigured_store_still_answers_with_a_job() {
    let (server, _) = build(Arc::new(MemoryQueueStore::new()));
    let response = server
        .handle_trigger_json(&admin(), br#"{"storeId":"bare","type":"pull"}"#)
        .unwrap();

    let job = finished(&server, response.job_id).await;
    assert_eq!(job.state, JobState::Failed);
    assert!(job.error.unwrap().contains("credentials"));

    let status = server
        .handle_store_status(&admin(), &StoreId::new("bare"))
        .await
        .unwrap();
    assert!(!status.aims_connected);
}

#[tokio::test]
async fn failed_items_surface_and_can_be_cleared() {
    let (server, client) = build(Arc::new(MemoryQueueStore::new()));
    for code in ["A1", "A2", "A3"] {
        server
            .engine()
            .enqueue(NewQueueItem::new("s1", EntityType::Spaces, code, SyncAction::Link, json!({})))
            .unwrap();
    }
    client.reject_entity("A2", ExternalError::permanent("unknown label"));

    let job = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Push))
        .unwrap()
        .job_id;
    let job = finished(&server, job).await;
    let push = job.push.unwrap();
    assert_eq!((push.succeeded, push.failed), (2, 1));

    let failed = server
        .handle_queue(&admin(), &QueueQuery::for_store("s1").with_status(QueueStatus::Failed))
        .unwrap();
    assert_eq!(failed.total, 1);
    assert_eq!(failed.items[0].entity_id, "A2");

    let overall = server.handle_status(&admin()).await.unwrap();
    assert_eq!(overall.health, SyncHealth::Degraded);

    assert_eq!(server.handle_clear_failed(&admin(), &StoreId::new("s1")).unwrap(), 1);
    let overall = server.handle_status(&admin()).await.unwrap();
    assert_eq!(overall.health, SyncHealth::Idle);
}

#[tokio::test]
async fn jobs_are_listed_newest_first() {
    let (server, _) = build(Arc::new(MemoryQueueStore::new()));
    let first = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Pull))
        .unwrap()
        .job_id;
    let second = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Push))
        .unwrap()
        .job_id;
    finished(&server, first).await;
    finished(&server, second).await;

    let jobs = server.handle_jobs(&admin(), Some(&StoreId::new("s1"))).unwrap();
    assert_eq!(jobs.iter().map(|j| j.job_id).collect::<Vec<_>>(), vec![second, first]);

    let outsider = Principal::new("v", Role::StoreViewer).with_store("other");
    assert!(server.handle_jobs(&outsider, None).unwrap().is_empty());
    assert_eq!(server.handle_job(&outsider, first).unwrap_err().status_code(), 403);
}

#[tokio::test]
async fn shutdown_cancels_new_jobs() {
    let (server, _) = build(Arc::new(MemoryQueueStore::new()));
    server.shutdown().await;

    let job = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Push))
        .unwrap()
        .job_id;
    let job = finished(&server, job).await;
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.error.as_deref(), Some("sync cancelled"));
}

#[tokio::test]
async fn file_backed_queue_behind_the_server() {
    let dir = tempfile::tempdir().unwrap();
    let queue = Arc::new(FileQueueStore::open(dir.path(), true).unwrap());
    let (server, _) = build(queue);
    server
        .engine()
        .enqueue(NewQueueItem::new("s1", EntityType::People, "p1", SyncAction::Create, json!({})))
        .unwrap();

    let job = server
        .handle_trigger(&admin(), TriggerSyncRequest::new("s1", SyncType::Push))
        .unwrap()
        .job_id;
    assert_eq!(finished(&server, job).await.state, JobState::Completed);

    let counts = server.engine().queue().counts(Some(&StoreId::new("s1"))).unwrap();
    assert_eq!(counts.completed, 1);
    assert!(dir.path().join("queue.json").exists());
}
