// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::{hotel_page, rate_policy, seed, Scripted, StaticRobots, TestEnv};
use social_discovery::domain::models::checkpoint::{CheckpointEntry, CheckpointOutcome};
use social_discovery::domain::models::crawl_job::JobStatus;
use social_discovery::domain::models::discovered_link::SocialNetwork;
use social_discovery::domain::models::fetch_attempt::AttemptOutcome;
use social_discovery::domain::models::proxy::ProxyHealth;
use social_discovery::domain::models::work_item::{FailureKind, ItemStatus};
use social_discovery::domain::repositories::job_repository::JobRepository;
use social_discovery::domain::repositories::proxy_repository::ProxyRepository;
use social_discovery::infrastructure::repositories::{JobRepositoryImpl, ProxyRepositoryImpl};
use social_discovery::workers::OrchestratorConfig;
use std::sync::Arc;
use std::time::Duration;

/// 首页上的 Facebook 链接被发现，任务完成并写入检查点
#[tokio::test]
async fn test_discovers_social_link_and_completes_job() {
    let env = TestEnv::new().await;
    let url = "https://grand-hotel.test/";
    env.engine.script(
        url,
        vec![Scripted::Page(200, hotel_page("https://www.facebook.com/GrandHotel"))],
    );

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    let summary = orchestrator.dispatch_pending().await.unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.jobs_finished, 1);

    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 1);
    assert!(job.completed_at.is_some());
    assert_eq!(job.metadata["batch_name"], "test-batch");
    assert_eq!(job.metadata["hotel_domain"], "grand-hotel.test");

    let links = orchestrator.links(job_id).await.unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].network, SocialNetwork::Facebook);
    assert_eq!(links[0].url, "https://www.facebook.com/GrandHotel");
    assert_eq!(links[0].source_url, url);
    assert!(links[0].is_active);

    let attempts = orchestrator.attempts(job_id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(attempts[0].status_code, Some(200));

    let entry = env.checkpoints.get(job_id, url).await.unwrap().unwrap();
    assert_eq!(entry.outcome, CheckpointOutcome::Succeeded);
    assert_eq!(entry.summary.as_deref(), Some("1 links"));
}

/// 持续超时：恰好 max_attempts 次尝试后失败
#[tokio::test]
async fn test_timeouts_exhaust_retry_budget() {
    let env = TestEnv::new().await;
    let url = "https://slow-hotel.test/";
    env.engine.script(url, vec![Scripted::Timeout]);

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    let summary = orchestrator.dispatch_pending().await.unwrap();

    assert_eq!(env.engine.calls_to(url).len(), 3);
    assert_eq!(summary.retried, 2);
    assert_eq!(summary.failed, 1);

    let items = orchestrator.items(job_id).await.unwrap();
    assert_eq!(items[0].status, ItemStatus::Failed);
    assert_eq!(items[0].failure_kind, Some(FailureKind::RetriesExhausted));
    assert_eq!(items[0].attempts, 3);

    let attempts = orchestrator.attempts(job_id).await.unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts
        .iter()
        .all(|a| a.outcome == AttemptOutcome::TransientNetwork));

    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 3);
    assert!(job.last_error.is_some());
}

/// robots.txt 禁止：一次尝试，不发请求，不重试
#[tokio::test]
async fn test_robots_disallow_is_terminal() {
    let mut env = TestEnv::new().await;
    env.robots = Arc::new(StaticRobots {
        disallowed_paths: vec!["/private".to_string()],
    });
    let url = "https://closed-hotel.test/private/home";

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    orchestrator.dispatch_pending().await.unwrap();

    assert!(env.engine.calls().is_empty());

    let attempts = orchestrator.attempts(job_id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::RobotsDisallowed);

    let items = orchestrator.items(job_id).await.unwrap();
    assert_eq!(items[0].failure_kind, Some(FailureKind::RobotsDisallowed));
    assert_eq!(
        orchestrator.status(job_id).await.unwrap().status,
        JobStatus::Failed
    );
}

/// 同一域名的两次派发至少间隔一个基础间隔
#[tokio::test]
async fn test_same_domain_requests_are_spaced() {
    let mut env = TestEnv::new().await;
    env.rate = rate_policy(Duration::from_millis(300));

    let orchestrator = env.orchestrator();
    let seeds = [
        seed("https://spaced-hotel.test/"),
        seed("https://spaced-hotel.test/contact"),
    ];
    let job_ids = orchestrator
        .submit("spacing", &seeds, serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(job_ids.len(), 1);

    orchestrator.dispatch_pending().await.unwrap();

    let calls = env.engine.calls();
    assert_eq!(calls.len(), 2);
    let gap = calls[1].at.duration_since(calls[0].at);
    assert!(gap >= Duration::from_millis(250), "gap was {:?}", gap);
    assert_eq!(
        orchestrator.status(job_ids[0]).await.unwrap().status,
        JobStatus::Completed
    );
}

/// 429 后该域名的间隔翻倍
#[tokio::test]
async fn test_rate_limited_domain_backs_off() {
    let mut env = TestEnv::new().await;
    env.rate = rate_policy(Duration::from_millis(100));
    let url = "https://busy-hotel.test/";
    env.engine.script(
        url,
        vec![
            Scripted::Page(429, String::new()),
            Scripted::Page(200, hotel_page("https://instagram.com/busyhotel")),
        ],
    );

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    orchestrator.dispatch_pending().await.unwrap();

    let calls = env.engine.calls_to(url);
    assert_eq!(calls.len(), 2);
    let gap = calls[1].at.duration_since(calls[0].at);
    assert!(gap >= Duration::from_millis(180), "gap was {:?}", gap);
    assert_eq!(
        orchestrator.status(job_id).await.unwrap().status,
        JobStatus::Completed
    );
}

/// 不同结果的工作项汇总为 partial
#[tokio::test]
async fn test_mixed_results_make_job_partial() {
    let env = TestEnv::new().await;
    env.engine.script(
        "https://mixed-hotel.test/",
        vec![Scripted::Page(200, hotel_page("https://www.tiktok.com/@mixedhotel"))],
    );
    env.engine
        .script("https://mixed-hotel.test/gone", vec![Scripted::Page(404, String::new())]);

    let orchestrator = env.orchestrator();
    let seeds = [
        seed("https://mixed-hotel.test/"),
        seed("https://mixed-hotel.test/gone"),
    ];
    let job_ids = orchestrator
        .submit("mixed", &seeds, serde_json::Value::Null)
        .await
        .unwrap();
    orchestrator.dispatch_pending().await.unwrap();

    let job = orchestrator.status(job_ids[0]).await.unwrap();
    assert_eq!(job.status, JobStatus::Partial);
    assert!(job.last_error.unwrap().contains("404"));

    let failed: Vec<_> = orchestrator
        .items(job_ids[0])
        .await
        .unwrap()
        .into_iter()
        .filter(|item| item.status == ItemStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].failure_kind, Some(FailureKind::PermanentHttp));
}

/// 验证码页进入人工复核队列
#[tokio::test]
async fn test_captcha_items_are_queued_for_review() {
    let env = TestEnv::new().await;
    let url = "https://guarded-hotel.test/";
    env.engine.script(
        url,
        vec![Scripted::Page(
            200,
            "<html><div class=\"g-recaptcha\">Verify you are human</div></html>".to_string(),
        )],
    );

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    orchestrator.dispatch_pending().await.unwrap();

    let review = orchestrator.review_items(job_id).await.unwrap();
    assert_eq!(review.len(), 1);
    assert_eq!(review[0].url, url);
    assert_eq!(env.engine.calls_to(url).len(), 1);
}

/// 检查点命中的工作项被跳过；强制模式下重新抓取
#[tokio::test]
async fn test_resume_skips_checkpointed_items_unless_forced() {
    let env = TestEnv::new().await;
    let url = "https://resumed-hotel.test/";

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;
    env.checkpoints
        .record(CheckpointEntry::new(
            job_id,
            url,
            CheckpointOutcome::Succeeded,
            Some("1 links".to_string()),
        ))
        .await
        .unwrap();

    let forced = env.orchestrator_with(OrchestratorConfig {
        force: true,
        ..env.config()
    });
    // 强制模式先运行会清掉检查点
    let other_url = "https://forced-hotel.test/";
    let forced_job = env.submit_one(&forced, other_url).await;
    env.checkpoints
        .record(CheckpointEntry::new(
            forced_job,
            other_url,
            CheckpointOutcome::Succeeded,
            None,
        ))
        .await
        .unwrap();

    let summary = forced.dispatch_pending().await.unwrap();
    assert_eq!(summary.skipped, 0);
    assert_eq!(env.engine.calls_to(url).len(), 1);
    assert_eq!(env.engine.calls_to(other_url).len(), 1);

    // 一个全新的任务：检查点存在时恢复运行不发请求
    let third_url = "https://checkpointed-hotel.test/";
    let third_job = env.submit_one(&orchestrator, third_url).await;
    env.checkpoints
        .record(CheckpointEntry::new(
            third_job,
            third_url,
            CheckpointOutcome::Succeeded,
            Some("0 links".to_string()),
        ))
        .await
        .unwrap();

    let summary = env.orchestrator().dispatch_pending().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.dispatched, 0);
    assert!(env.engine.calls_to(third_url).is_empty());

    let items = orchestrator.items(third_job).await.unwrap();
    assert_eq!(items[0].status, ItemStatus::Succeeded);
    assert_eq!(
        orchestrator.status(third_job).await.unwrap().status,
        JobStatus::Completed
    );
}

/// 上次运行遗留的 running 工作项记为中断并重试
#[tokio::test]
async fn test_interrupted_attempt_is_recovered() {
    let env = TestEnv::new().await;
    let url = "https://crashed-hotel.test/";

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;

    let jobs = JobRepositoryImpl::new(env.db.clone());
    let item = jobs.find_items_by_job(job_id).await.unwrap().remove(0);
    jobs.update_item(&item.start().unwrap()).await.unwrap();

    let restarted = env.orchestrator_with(OrchestratorConfig {
        stale_after: Duration::ZERO,
        ..env.config()
    });
    let summary = restarted.dispatch_pending().await.unwrap();
    assert_eq!(summary.interrupted, 1);
    assert_eq!(summary.succeeded, 1);

    let attempts = restarted.attempts(job_id).await.unwrap();
    let outcomes: Vec<_> = attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![AttemptOutcome::Interrupted, AttemptOutcome::Success]
    );

    let items = restarted.items(job_id).await.unwrap();
    assert_eq!(items[0].status, ItemStatus::Succeeded);
    assert_eq!(items[0].attempts, 2);
}

/// 最近才开始的 running 工作项仍归其他调度器所有，不按中断处理
#[tokio::test]
async fn test_fresh_running_item_is_left_to_its_owner() {
    let env = TestEnv::new().await;
    let url = "https://busy-hotel.test/";

    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;

    let jobs = JobRepositoryImpl::new(env.db.clone());
    let item = jobs.find_items_by_job(job_id).await.unwrap().remove(0);
    jobs.update_item(&item.start().unwrap()).await.unwrap();

    let summary = env.orchestrator().dispatch_pending().await.unwrap();
    assert_eq!(summary.interrupted, 0);
    assert_eq!(summary.dispatched, 0);
    assert!(env.engine.calls().is_empty());

    let items = orchestrator.items(job_id).await.unwrap();
    assert_eq!(items[0].status, ItemStatus::Running);
    assert_eq!(items[0].attempts, 1);
    assert!(orchestrator.attempts(job_id).await.unwrap().is_empty());
    assert!(!orchestrator.status(job_id).await.unwrap().status.is_terminal());
}

/// 两个调度器共享数据库并发运行，每个工作项只被认领和抓取一次
#[tokio::test]
async fn test_concurrent_dispatchers_claim_each_item_once() {
    let env = TestEnv::new().await;
    let urls = [
        "https://north-hotel.test/",
        "https://south-hotel.test/",
        "https://east-hotel.test/",
    ];
    for url in urls {
        env.engine.script(
            url,
            vec![Scripted::Delayed(
                Duration::from_millis(50),
                200,
                hotel_page("https://www.facebook.com/SharedHotel"),
            )],
        );
    }

    let first = env.orchestrator();
    let second = env.orchestrator();
    let seeds: Vec<_> = urls.iter().map(|url| seed(url)).collect();
    let job_ids = first
        .submit("shared", &seeds, serde_json::Value::Null)
        .await
        .unwrap();
    assert_eq!(job_ids.len(), 3);

    let (a, b) = tokio::join!(first.dispatch_pending(), second.dispatch_pending());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(env.engine.calls().len(), 3);
    for url in urls {
        assert_eq!(env.engine.calls_to(url).len(), 1);
    }
    assert_eq!(a.dispatched + b.dispatched, 3);
    assert_eq!(a.succeeded + b.succeeded, 3);
    assert_eq!(a.interrupted + b.interrupted, 0);

    for job_id in job_ids {
        let job = first.status(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert_eq!(first.attempts(job_id).await.unwrap().len(), 1);
        assert_eq!(first.items(job_id).await.unwrap()[0].attempts, 1);
    }
}

/// 另一个进程中止任务后，正在运行的调度器不再派发该任务的工作项
#[tokio::test]
async fn test_abort_from_another_process_stops_dispatch() {
    let mut env = TestEnv::new().await;
    env.rate = rate_policy(Duration::from_millis(300));
    let seeds: Vec<_> = ["/", "/rooms", "/dining", "/spa", "/contact"]
        .iter()
        .map(|path| seed(&format!("https://stopped-hotel.test{}", path)))
        .collect();

    let worker = env.orchestrator();
    let operator = env.orchestrator();
    let job_id = worker
        .submit("abort", &seeds, serde_json::Value::Null)
        .await
        .unwrap()[0];

    let (summary, aborted) = tokio::join!(worker.dispatch_pending(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        operator.abort(job_id, "operator request").await
    });
    let summary = summary.unwrap();
    aborted.unwrap();

    assert_eq!(env.engine.calls().len(), 1);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.jobs_finished, 0);

    let job = worker.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("aborted: operator request"));
    assert_eq!(job.attempts, 1);

    let items = worker.items(job_id).await.unwrap();
    let succeeded = items
        .iter()
        .filter(|item| item.status == ItemStatus::Succeeded)
        .count();
    let aborted = items
        .iter()
        .filter(|item| item.failure_kind == Some(FailureKind::Aborted))
        .count();
    assert_eq!((succeeded, aborted), (1, 4));
    assert!(items
        .iter()
        .filter(|item| item.status == ItemStatus::Failed)
        .all(|item| item.attempts == 0));
    assert_eq!(worker.attempts(job_id).await.unwrap().len(), 1);
}

/// 中止时已派发的请求允许结束，其可重试的失败直接记为中止，不再重试
#[tokio::test]
async fn test_abort_during_dispatch_drains_in_flight_attempt() {
    let env = TestEnv::new().await;
    let urls = [
        "https://draining-hotel.test/",
        "https://draining-hotel.test/rooms",
        "https://draining-hotel.test/spa",
    ];
    for url in urls {
        env.engine.script(
            url,
            vec![Scripted::Delayed(Duration::from_millis(300), 503, String::new())],
        );
    }
    let seeds: Vec<_> = urls.iter().map(|url| seed(url)).collect();

    let orchestrator = env.orchestrator();
    let job_id = orchestrator
        .submit("drain", &seeds, serde_json::Value::Null)
        .await
        .unwrap()[0];

    let (summary, aborted) = tokio::join!(orchestrator.dispatch_pending(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        orchestrator.abort(job_id, "operator request").await
    });
    let summary = summary.unwrap();
    aborted.unwrap();

    let calls = env.engine.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retried, 0);

    let items = orchestrator.items(job_id).await.unwrap();
    assert!(items
        .iter()
        .all(|item| item.failure_kind == Some(FailureKind::Aborted)));
    let drained = items.iter().find(|item| item.url == calls[0].url).unwrap();
    assert_eq!(drained.attempts, 1);
    assert_eq!(
        drained.last_error.as_deref(),
        Some("aborted: job aborted while in flight")
    );

    let attempts = orchestrator.attempts(job_id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::TransientNetwork);

    // 中止的工作项不写检查点，强制重试后可以重新抓取
    for url in urls {
        assert!(!env.checkpoints.is_done(job_id, url).await.unwrap());
    }
    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("aborted: operator request"));
}

/// 中止后排队的工作项不再派发；强制重试后重新跑完
#[tokio::test]
async fn test_abort_then_force_retry() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let seeds = [
        seed("https://paused-hotel.test/"),
        seed("https://paused-hotel.test/about"),
    ];
    let job_id = orchestrator
        .submit("abort", &seeds, serde_json::Value::Null)
        .await
        .unwrap()[0];

    let job = orchestrator.abort(job_id, "operator request").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.last_error.as_deref(), Some("aborted: operator request"));
    assert!(orchestrator.abort(job_id, "again").await.is_err());

    let summary = orchestrator.dispatch_pending().await.unwrap();
    assert_eq!(summary.dispatched, 0);
    assert!(env.engine.calls().is_empty());
    let items = orchestrator.items(job_id).await.unwrap();
    assert!(items
        .iter()
        .all(|item| item.failure_kind == Some(FailureKind::Aborted)));

    let job = orchestrator.force_retry(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    orchestrator.dispatch_pending().await.unwrap();
    assert_eq!(env.engine.calls().len(), 2);
    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
}

/// 已完成任务强制重试：清除检查点，重新抓取，尝试次数只增不减
#[tokio::test]
async fn test_force_retry_refetches_completed_job() {
    let env = TestEnv::new().await;
    let url = "https://repeat-hotel.test/";
    let orchestrator = env.orchestrator();
    let job_id = env.submit_one(&orchestrator, url).await;

    orchestrator.dispatch_pending().await.unwrap();
    assert!(env.checkpoints.is_done(job_id, url).await.unwrap());

    orchestrator.force_retry(job_id).await.unwrap();
    assert!(!env.checkpoints.is_done(job_id, url).await.unwrap());

    orchestrator.dispatch_pending().await.unwrap();
    assert_eq!(env.engine.calls_to(url).len(), 2);

    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 2);
    assert_eq!(orchestrator.attempts(job_id).await.unwrap().len(), 2);
}

/// 重新提交同一个任务ID不会产生重复工作项
#[tokio::test]
async fn test_resubmitting_job_is_idempotent() {
    let env = TestEnv::new().await;
    let orchestrator = env.orchestrator();
    let hotel_id = uuid::Uuid::new_v4();
    let targets = [(hotel_id, url::Url::parse("https://same-hotel.test/").unwrap())];

    let job_id = orchestrator
        .submit_job(None, &targets, serde_json::json!({"source": "test"}))
        .await
        .unwrap();
    let again = orchestrator
        .submit_job(Some(job_id), &targets, serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(job_id, again);
    assert_eq!(orchestrator.items(job_id).await.unwrap().len(), 1);
    let job = orchestrator.status(job_id).await.unwrap();
    assert_eq!(job.metadata["source"], "test");
}

/// 代理按最久未用轮换，健康状态写回数据库
#[tokio::test]
async fn test_proxies_rotate_and_are_persisted() {
    let mut env = TestEnv::new().await;
    env.proxies = vec![
        "http://p1.proxy.test:8080".to_string(),
        "http://p2.proxy.test:8080".to_string(),
    ];
    let orchestrator = env.orchestrator_with(OrchestratorConfig {
        concurrency: 1,
        ..env.config()
    });
    let seeds = [
        seed("https://one-hotel.test/"),
        seed("https://two-hotel.test/"),
        seed("https://three-hotel.test/"),
        seed("https://four-hotel.test/"),
    ];
    orchestrator
        .submit("proxies", &seeds, serde_json::Value::Null)
        .await
        .unwrap();
    orchestrator.dispatch_pending().await.unwrap();

    let used: Vec<String> = env
        .engine
        .calls()
        .into_iter()
        .map(|c| c.proxy.unwrap())
        .collect();
    assert_eq!(
        used,
        vec![
            "http://p1.proxy.test:8080",
            "http://p2.proxy.test:8080",
            "http://p1.proxy.test:8080",
            "http://p2.proxy.test:8080",
        ]
    );

    let stored = ProxyRepositoryImpl::new(env.db.clone()).list_all().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|p| p.health == ProxyHealth::Healthy));
    assert!(stored.iter().all(|p| p.last_used_at.is_some()));
}
