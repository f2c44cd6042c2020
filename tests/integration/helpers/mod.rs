// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use social_discovery::application::dto::hotel_seed::HotelSeed;
use social_discovery::config::settings::DatabaseSettings;
use social_discovery::domain::repositories::checkpoint_store::CheckpointStore;
use social_discovery::engines::fetch_pipeline::FetchPipeline;
use social_discovery::engines::proxy_manager::{ProxyManager, ProxyPolicy};
use social_discovery::engines::traits::{EngineError, FetchEngine, FetchRequest, FetchResponse};
use social_discovery::infrastructure::checkpoint::DbCheckpointStore;
use social_discovery::infrastructure::database::connection;
use social_discovery::infrastructure::repositories::{
    FetchAttemptRepositoryImpl, HotelRepositoryImpl, JobRepositoryImpl, LinkRepositoryImpl,
    ProxyRepositoryImpl,
};
use social_discovery::queue::domain_rate_limiter::{DomainRateLimiter, RateLimitPolicy};
use social_discovery::utils::retry_policy::RetryPolicy;
use social_discovery::utils::robots::RobotsCheckerTrait;
use social_discovery::workers::{CrawlStores, JobOrchestrator, OrchestratorConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use uuid::Uuid;

/// 基于临时 SQLite 文件的数据库，`TempDir` 释放时删除
pub async fn create_test_db() -> (TempDir, Arc<DatabaseConnection>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = DatabaseSettings {
        url: format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display()),
        max_connections: None,
        min_connections: None,
        connect_timeout: Some(5),
        idle_timeout: None,
    };
    let db = connection::create_pool(&settings)
        .await
        .expect("connect sqlite");
    Migrator::up(&db, None).await.expect("migrations");
    (dir, Arc::new(db))
}

/// 脚本化的应答
#[derive(Debug, Clone)]
pub enum Scripted {
    Page(u16, String),
    /// 等待给定时长后返回页面，模拟慢响应
    Delayed(Duration, u16, String),
    Timeout,
}

/// 一次请求的记录
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub proxy: Option<String>,
    pub at: Instant,
}

/// 按 URL 返回预设应答的抓取引擎
///
/// 某个 URL 的脚本用完后重复最后一条；没有脚本的 URL 返回空白 200
#[derive(Default)]
pub struct ScriptedEngine {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedEngine {
    pub fn script(&self, url: &str, responses: Vec<Scripted>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, url: &str) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|c| c.url == url).collect()
    }

    fn next(&self, url: &str) -> Scripted {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Scripted::Page(200, String::new())),
            None => Scripted::Page(200, String::new()),
        }
    }
}

#[async_trait]
impl FetchEngine for ScriptedEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, EngineError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: request.url.clone(),
            proxy: request.proxy.clone(),
            at: Instant::now(),
        });

        let (status_code, content) = match self.next(&request.url) {
            Scripted::Page(status_code, content) => (status_code, content),
            Scripted::Delayed(delay, status_code, content) => {
                tokio::time::sleep(delay).await;
                (status_code, content)
            }
            Scripted::Timeout => return Err(EngineError::Timeout),
        };
        Ok(FetchResponse {
            status_code,
            content,
            content_type: "text/html".to_string(),
            final_url: request.url.clone(),
            response_time_ms: 1,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 固定结果的 robots 检查
pub struct StaticRobots {
    pub disallowed_paths: Vec<String>,
}

#[async_trait]
impl RobotsCheckerTrait for StaticRobots {
    async fn is_allowed(&self, url_str: &str, _user_agent: &str) -> anyhow::Result<bool> {
        let url = url::Url::parse(url_str)?;
        Ok(!self
            .disallowed_paths
            .iter()
            .any(|prefix| url.path().starts_with(prefix.as_str())))
    }

    async fn get_crawl_delay(
        &self,
        _url_str: &str,
        _user_agent: &str,
    ) -> anyhow::Result<Option<Duration>> {
        Ok(None)
    }
}

/// 包含一个社交链接、足够长且链接充足的页面
pub fn hotel_page(social_href: &str) -> String {
    let nav = "<a href=\"/rooms\">Rooms</a>".repeat(10);
    format!(
        "<html><body>{}<a href=\"{}\">social</a>{}</body></html>",
        nav,
        social_href,
        " ".repeat(2100)
    )
}

pub fn seed(url: &str) -> HotelSeed {
    HotelSeed::new(url).expect("valid seed")
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        enable_jitter: false,
        ..RetryPolicy::default()
    }
}

pub fn rate_policy(interval: Duration) -> RateLimitPolicy {
    RateLimitPolicy {
        base_interval: interval,
        ..RateLimitPolicy::default()
    }
}

/// 测试环境：同一个数据库上可以多次构建编排器，模拟进程重启
pub struct TestEnv {
    pub db: Arc<DatabaseConnection>,
    pub engine: Arc<ScriptedEngine>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub robots: Arc<dyn RobotsCheckerTrait>,
    pub retry: RetryPolicy,
    pub rate: RateLimitPolicy,
    pub proxies: Vec<String>,
    _dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let (dir, db) = create_test_db().await;
        Self {
            checkpoints: Arc::new(DbCheckpointStore::new(db.clone())),
            db,
            engine: Arc::new(ScriptedEngine::default()),
            robots: Arc::new(StaticRobots {
                disallowed_paths: Vec::new(),
            }),
            retry: fast_retry(3),
            rate: rate_policy(Duration::from_millis(20)),
            proxies: Vec::new(),
            _dir: dir,
        }
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            concurrency: 4,
            request_timeout: Duration::from_secs(2),
            persistence_retry: Duration::from_millis(20),
            ..OrchestratorConfig::default()
        }
    }

    pub fn orchestrator(&self) -> JobOrchestrator {
        self.orchestrator_with(self.config())
    }

    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> JobOrchestrator {
        let pipeline = FetchPipeline::new(
            self.engine.clone(),
            self.robots.clone(),
            "hotel-social-discover/test",
        );
        let stores = CrawlStores {
            hotels: Arc::new(HotelRepositoryImpl::new(self.db.clone())),
            jobs: Arc::new(JobRepositoryImpl::new(self.db.clone())),
            attempts: Arc::new(FetchAttemptRepositoryImpl::new(self.db.clone())),
            links: Arc::new(LinkRepositoryImpl::new(self.db.clone())),
            proxies: Some(Arc::new(ProxyRepositoryImpl::new(self.db.clone()))),
        };
        JobOrchestrator::new(
            stores,
            self.checkpoints.clone(),
            Arc::new(pipeline),
            ProxyManager::new(self.proxies.clone(), ProxyPolicy::default()),
            DomainRateLimiter::new(self.rate.clone()),
            self.retry.clone(),
            config,
        )
    }

    /// 提交单个酒店，返回任务ID
    pub async fn submit_one(&self, orchestrator: &JobOrchestrator, url: &str) -> Uuid {
        let ids = orchestrator
            .submit("test-batch", &[seed(url)], serde_json::Value::Null)
            .await
            .expect("submit");
        assert_eq!(ids.len(), 1);
        ids[0]
    }
}
