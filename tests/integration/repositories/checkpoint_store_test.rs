// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use social_discovery::domain::models::checkpoint::{CheckpointEntry, CheckpointOutcome};
use social_discovery::domain::repositories::checkpoint_store::CheckpointStore;
use social_discovery::infrastructure::checkpoint::DbCheckpointStore;
use uuid::Uuid;

#[tokio::test]
async fn test_db_checkpoints_upsert_and_clear() {
    let (_dir, db) = create_test_db().await;
    let store = DbCheckpointStore::new(db);
    store.load().await.unwrap();
    let job_id = Uuid::new_v4();
    let url = "https://grand-hotel.test/";

    store
        .record(CheckpointEntry::new(job_id, url, CheckpointOutcome::Failed, Some("retries_exhausted".into())))
        .await
        .unwrap();
    store
        .record(CheckpointEntry::new(job_id, url, CheckpointOutcome::Succeeded, Some("3 links".into())))
        .await
        .unwrap();

    let entry = store.get(job_id, url).await.unwrap().unwrap();
    assert_eq!(entry.outcome, CheckpointOutcome::Succeeded);
    assert_eq!(entry.summary.as_deref(), Some("3 links"));
    assert!(!store.is_done(Uuid::new_v4(), url).await.unwrap());

    store.clear(job_id, url).await.unwrap();
    assert!(!store.is_done(job_id, url).await.unwrap());

    for url in ["https://a.test/", "https://b.test/"] {
        store
            .record(CheckpointEntry::new(job_id, url, CheckpointOutcome::Succeeded, None))
            .await
            .unwrap();
    }
    assert_eq!(store.clear_job(job_id).await.unwrap(), 2);
    store.flush().await.unwrap();
}

#[tokio::test]
async fn test_db_checkpoint_repeated_record_is_idempotent() {
    let (_dir, db) = create_test_db().await;
    let store = DbCheckpointStore::new(db);
    let job_id = Uuid::new_v4();
    let url = "https://grand-hotel.test/";

    store
        .record(CheckpointEntry::new(job_id, url, CheckpointOutcome::Succeeded, Some("1 links".into())))
        .await
        .unwrap();
    let first = store.get(job_id, url).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store
        .record(CheckpointEntry::new(job_id, url, CheckpointOutcome::Succeeded, Some("1 links".into())))
        .await
        .unwrap();
    let second = store.get(job_id, url).await.unwrap().unwrap();

    assert_eq!(first.recorded_at, second.recorded_at);
    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.summary, second.summary);
}
