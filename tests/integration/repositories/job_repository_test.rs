// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::create_test_db;
use chrono::{Duration, Utc};
use social_discovery::domain::models::crawl_job::{CrawlJob, JobStatus};
use social_discovery::domain::models::fetch_attempt::{AttemptOutcome, FetchAttempt};
use social_discovery::domain::models::work_item::{FailureKind, ItemStatus, WorkItem};
use social_discovery::domain::repositories::fetch_attempt_repository::FetchAttemptRepository;
use social_discovery::domain::repositories::hotel_repository::HotelRepository;
use social_discovery::domain::repositories::job_repository::JobRepository;
use social_discovery::infrastructure::repositories::{
    FetchAttemptRepositoryImpl, HotelRepositoryImpl, JobRepositoryImpl,
};
use url::Url;
use uuid::Uuid;

#[tokio::test]
async fn test_hotel_upsert_by_domain() {
    let (_dir, db) = create_test_db().await;
    let repo = HotelRepositoryImpl::new(db);

    let first = repo.upsert_by_domain("grand-hotel.test", None).await.unwrap();
    let named = repo
        .upsert_by_domain("grand-hotel.test", Some("Grand Hotel"))
        .await
        .unwrap();
    let unchanged = repo.upsert_by_domain("grand-hotel.test", None).await.unwrap();

    assert_eq!(first.id, named.id);
    assert_eq!(named.name.as_deref(), Some("Grand Hotel"));
    assert_eq!(unchanged.name.as_deref(), Some("Grand Hotel"));
    assert_eq!(
        repo.find_by_id(first.id).await.unwrap().unwrap().domain,
        "grand-hotel.test"
    );
}

#[tokio::test]
async fn test_job_round_trip_and_attempt_counter() {
    let (_dir, db) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);

    let job = CrawlJob::new(Uuid::new_v4(), serde_json::json!({"batch_name": "spring"}));
    let created = repo.create_job_if_absent(&job).await.unwrap();
    assert_eq!(created.status, JobStatus::Queued);

    // 同ID再次创建返回已有记录
    let duplicate = CrawlJob::new(job.id, serde_json::json!({"batch_name": "other"}));
    let existing = repo.create_job_if_absent(&duplicate).await.unwrap();
    assert_eq!(existing.metadata["batch_name"], "spring");

    repo.increment_job_attempts(job.id).await.unwrap();
    repo.increment_job_attempts(job.id).await.unwrap();

    // update_job 不覆盖尝试次数
    let started = created.start().unwrap();
    repo.update_job(&started).await.unwrap();

    let stored = repo.find_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Running);
    assert_eq!(stored.attempts, 2);
    assert_eq!(repo.list_active_jobs().await.unwrap().len(), 1);

    let finished = stored.finish(JobStatus::Completed, None).unwrap();
    repo.update_job(&finished).await.unwrap();
    assert!(repo.list_active_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_items_are_unique_per_job_and_url() {
    let (_dir, db) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let job = repo
        .create_job_if_absent(&CrawlJob::new(Uuid::new_v4(), serde_json::json!({})))
        .await
        .unwrap();
    let hotel_id = Uuid::new_v4();
    let url = Url::parse("https://grand-hotel.test/").unwrap();

    let items = vec![WorkItem::new(job.id, hotel_id, &url).unwrap()];
    assert_eq!(repo.insert_items(&items).await.unwrap(), 1);
    let again = vec![WorkItem::new(job.id, hotel_id, &url).unwrap()];
    assert_eq!(repo.insert_items(&again).await.unwrap(), 0);
    assert_eq!(repo.insert_items(&[]).await.unwrap(), 0);

    let stored = repo.find_items_by_job(job.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].domain, "grand-hotel.test");

    let failed = stored[0]
        .clone()
        .start()
        .unwrap()
        .fail(FailureKind::CaptchaDetected, Some("captcha".to_string()));
    repo.update_item(&failed).await.unwrap();

    let reloaded = repo.find_items_by_job(job.id).await.unwrap().remove(0);
    assert_eq!(reloaded.status, ItemStatus::Failed);
    assert_eq!(reloaded.failure_kind, Some(FailureKind::CaptchaDetected));
    assert_eq!(reloaded.attempts, 1);
}

#[tokio::test]
async fn test_conditional_item_update_claims_once() {
    let (_dir, db) = create_test_db().await;
    let repo = JobRepositoryImpl::new(db);
    let job = repo
        .create_job_if_absent(&CrawlJob::new(Uuid::new_v4(), serde_json::json!({})))
        .await
        .unwrap();
    let url = Url::parse("https://shared-hotel.test/").unwrap();
    let items = vec![WorkItem::new(job.id, Uuid::new_v4(), &url).unwrap()];
    repo.insert_items(&items).await.unwrap();
    let queued = repo.find_items_by_job(job.id).await.unwrap().remove(0);

    // 两个 worker 基于同一快照认领，只有一个成功
    let claimed = queued.clone().start().unwrap();
    assert!(repo.update_item_if(&claimed, &queued, None).await.unwrap());
    assert!(!repo.update_item_if(&claimed, &queued, None).await.unwrap());

    let running = repo.find_items_by_job(job.id).await.unwrap().remove(0);
    assert_eq!(running.status, ItemStatus::Running);
    assert_eq!(running.attempts, 1);

    // 最近更新过的 running 工作项不能被当作中断接手
    let requeued = running
        .clone()
        .requeue(Utc::now(), Some("interrupted".to_string()));
    let long_ago = Utc::now() - Duration::minutes(5);
    assert!(!repo
        .update_item_if(&requeued, &running, Some(long_ago))
        .await
        .unwrap());
    let later = Utc::now() + Duration::seconds(5);
    assert!(repo
        .update_item_if(&requeued, &running, Some(later))
        .await
        .unwrap());

    let reloaded = repo.find_items_by_job(job.id).await.unwrap().remove(0);
    assert_eq!(reloaded.status, ItemStatus::Queued);
    assert_eq!(reloaded.attempts, 1);
    assert_eq!(reloaded.last_error.as_deref(), Some("interrupted"));
}

#[tokio::test]
async fn test_attempts_are_append_only() {
    let (_dir, db) = create_test_db().await;
    let repo = FetchAttemptRepositoryImpl::new(db);
    let (job_id, item_id) = (Uuid::new_v4(), Uuid::new_v4());

    let first = FetchAttempt::new(job_id, item_id, "https://a.test/", AttemptOutcome::TransientNetwork)
        .with_error("timed out");
    let mut second = FetchAttempt::new(job_id, item_id, "https://a.test/", AttemptOutcome::Success);
    second.status_code = Some(200);
    second.proxy = Some("http://***@proxy.test:8080".to_string());
    repo.append(&first).await.unwrap();
    repo.append(&second).await.unwrap();

    assert_eq!(repo.count_by_item(item_id).await.unwrap(), 2);
    assert_eq!(repo.count_by_item(Uuid::new_v4()).await.unwrap(), 0);

    let listed = repo.list_by_job(job_id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].outcome, AttemptOutcome::TransientNetwork);
    assert_eq!(listed[0].error.as_deref(), Some("timed out"));
    assert_eq!(listed[1].status_code, Some(200));
    assert_eq!(listed[1].proxy.as_deref(), Some("http://***@proxy.test:8080"));
}
