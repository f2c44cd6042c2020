// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::application::dto::hotel_seed::HotelSeed;
use crate::config::settings::Settings;
use crate::domain::models::checkpoint::{CheckpointEntry, CheckpointOutcome};
use crate::domain::models::crawl_job::{CrawlJob, JobStatus};
use crate::domain::models::discovered_link::DiscoveredLink;
use crate::domain::models::fetch_attempt::{AttemptOutcome, FetchAttempt};
use crate::domain::models::work_item::{FailureKind, ItemStatus, WorkItem};
use crate::domain::repositories::checkpoint_store::CheckpointStore;
use crate::domain::repositories::fetch_attempt_repository::FetchAttemptRepository;
use crate::domain::repositories::hotel_repository::HotelRepository;
use crate::domain::repositories::job_repository::JobRepository;
use crate::domain::repositories::link_repository::LinkRepository;
use crate::domain::repositories::proxy_repository::ProxyRepository;
use crate::engines::fetch_pipeline::{FetchPipeline, PipelineOutcome};
use crate::engines::proxy_manager::ProxyManager;
use crate::queue::domain_rate_limiter::{Admission, AdmissionPermit, DomainRateLimiter};
use crate::queue::work_queue::WorkQueue;
use crate::utils::errors::{CrawlError, OrchestratorError, RepositoryError};
use crate::utils::retry_policy::{RetryDecision, RetryPolicy};
use crate::utils::url_utils::domain_of;

/// 仓库层写入失败时的最大尝试次数
const PERSIST_ATTEMPTS: u32 = 5;

/// 编排器使用的持久化仓库
#[derive(Clone)]
pub struct CrawlStores {
    pub hotels: Arc<dyn HotelRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub attempts: Arc<dyn FetchAttemptRepository>,
    pub links: Arc<dyn LinkRepository>,
    /// 代理健康快照，未配置时不落库
    pub proxies: Option<Arc<dyn ProxyRepository>>,
}

/// 编排器配置
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 全局并发上限
    pub concurrency: usize,
    pub request_timeout: Duration,
    /// 启动时跳过检查点中已完成的 (任务, URL)
    pub resume: bool,
    /// 清除检查点并重新抓取活动任务的全部工作项
    pub force: bool,
    /// 代理全部不可用时直连
    pub direct_fallback: bool,
    /// 持久化失败后的重试间隔
    pub persistence_retry: Duration,
    /// running 工作项超过该时长未更新才视为中断，之前归属正在运行的 worker
    pub stale_after: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            request_timeout: Duration::from_secs(20),
            resume: true,
            force: false,
            direct_fallback: true,
            persistence_retry: Duration::from_secs(5),
            stale_after: Duration::from_secs(300),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            concurrency: settings.crawler.concurrency.max(1),
            request_timeout: settings.crawler.request_timeout(),
            resume: settings.crawler.resume,
            force: false,
            direct_fallback: settings.crawler.direct_fallback,
            persistence_retry: Duration::from_secs(settings.crawler.persistence_retry_secs),
            stale_after: Duration::from_secs(settings.crawler.stale_after_secs),
        }
    }
}

/// 一轮调度的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub dispatched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub retried: usize,
    /// 因检查点已完成而跳过
    pub skipped: usize,
    /// 上次运行中断的尝试
    pub interrupted: usize,
    pub jobs_finished: usize,
}

/// 调度过程中任务的内存视图
struct JobProgress {
    job: CrawlJob,
    counted_in_progress: bool,
}

impl JobProgress {
    fn new(job: CrawlJob) -> Self {
        Self {
            job,
            counted_in_progress: false,
        }
    }
}

/// 按存储中的工作项汇总任务终态，仍有未结束的工作项时返回 `None`
fn aggregate_items(items: &[WorkItem]) -> Option<JobStatus> {
    let mut succeeded = 0;
    let mut failed = 0;
    let mut pending = 0;
    for item in items {
        match item.status {
            ItemStatus::Succeeded => succeeded += 1,
            ItemStatus::Failed => failed += 1,
            ItemStatus::Queued | ItemStatus::Running => pending += 1,
        }
    }
    JobStatus::aggregate(succeeded, failed, pending)
}

/// 最近一次失败工作项的错误
fn last_failure(items: &[WorkItem]) -> Option<String> {
    items
        .iter()
        .filter(|item| item.status == ItemStatus::Failed)
        .max_by_key(|item| item.updated_at)
        .and_then(|item| item.last_error.clone())
}

/// 工作任务的返回值，`None` 表示尝试过程中任务崩溃
type AttemptResult = (WorkItem, Option<PipelineOutcome>);

/// 任务编排器
///
/// 负责任务与工作项状态机、有界并发调度、域名准入、代理选择与检查点
pub struct JobOrchestrator {
    stores: CrawlStores,
    checkpoints: Arc<dyn CheckpointStore>,
    pipeline: Arc<FetchPipeline>,
    proxies: ProxyManager,
    limiter: DomainRateLimiter,
    retry_policy: RetryPolicy,
    config: OrchestratorConfig,
}

impl JobOrchestrator {
    pub fn new(
        stores: CrawlStores,
        checkpoints: Arc<dyn CheckpointStore>,
        pipeline: Arc<FetchPipeline>,
        proxies: ProxyManager,
        limiter: DomainRateLimiter,
        retry_policy: RetryPolicy,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            stores,
            checkpoints,
            pipeline,
            proxies,
            limiter,
            retry_policy,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn proxies(&self) -> &ProxyManager {
        &self.proxies
    }

    /// 提交一批酒店种子
    ///
    /// 按酒店域名分组，每个酒店一个任务；批次名与批次ID合并进每个任务的元数据
    ///
    /// # 返回值
    ///
    /// 新建（或已存在）的任务ID列表，顺序与种子中酒店首次出现的顺序一致
    pub async fn submit(
        &self,
        batch_name: &str,
        seeds: &[HotelSeed],
        metadata: Value,
    ) -> Result<Vec<Uuid>, OrchestratorError> {
        if seeds.is_empty() {
            return Err(OrchestratorError::InvalidInput("no seeds supplied".to_string()));
        }
        let base = match metadata {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                return Err(OrchestratorError::InvalidInput(format!(
                    "metadata must be a JSON object, got {}",
                    other
                )))
            }
        };

        let mut groups: Vec<(String, Vec<&HotelSeed>)> = Vec::new();
        for seed in seeds {
            let url = Url::parse(&seed.url)
                .map_err(|e| OrchestratorError::InvalidInput(format!("{}: {}", seed.url, e)))?;
            let domain = domain_of(&url)
                .ok_or_else(|| OrchestratorError::InvalidInput(format!("no host in {}", url)))?;
            match groups.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, group)) => group.push(seed),
                None => groups.push((domain, vec![seed])),
            }
        }

        let batch_id = Uuid::new_v4();
        let mut job_ids = Vec::with_capacity(groups.len());
        for (domain, group) in groups {
            let name = group.iter().find_map(|seed| seed.name.as_deref());
            let hotel = self.stores.hotels.upsert_by_domain(&domain, name).await?;

            let mut job_metadata = base.clone();
            job_metadata.insert("batch_name".into(), json!(batch_name));
            job_metadata.insert("batch_id".into(), json!(batch_id));
            job_metadata.insert("hotel_id".into(), json!(hotel.id));
            job_metadata.insert("hotel_domain".into(), json!(hotel.domain));
            if let Some(hotel_ref) = group.iter().find_map(|seed| seed.hotel_ref.as_deref()) {
                job_metadata.insert("hotel_ref".into(), json!(hotel_ref));
            }

            let mut targets = Vec::with_capacity(group.len());
            for seed in group {
                let url = Url::parse(&seed.url)
                    .map_err(|e| OrchestratorError::InvalidInput(e.to_string()))?;
                targets.push((hotel.id, url));
            }

            let job_id = self
                .submit_job(None, &targets, Value::Object(job_metadata))
                .await?;
            job_ids.push(job_id);
        }

        info!(
            batch = %batch_name,
            batch_id = %batch_id,
            jobs = job_ids.len(),
            "Submitted batch"
        );
        Ok(job_ids)
    }

    /// 创建一个任务及其工作项
    ///
    /// 传入已有任务ID时幂等：任务不会重复创建，相同URL的工作项不会重复插入
    pub async fn submit_job(
        &self,
        job_id: Option<Uuid>,
        targets: &[(Uuid, Url)],
        metadata: Value,
    ) -> Result<Uuid, OrchestratorError> {
        if targets.is_empty() {
            return Err(OrchestratorError::InvalidInput("job has no targets".to_string()));
        }

        let candidate = CrawlJob::new(job_id.unwrap_or_else(Uuid::new_v4), metadata);
        let job = self.stores.jobs.create_job_if_absent(&candidate).await?;

        let mut items = Vec::with_capacity(targets.len());
        for (hotel_id, url) in targets {
            items.push(WorkItem::new(job.id, *hotel_id, url)?);
        }
        let inserted = self.stores.jobs.insert_items(&items).await?;

        debug!(job_id = %job.id, items = items.len(), inserted, "Job submitted");
        Ok(job.id)
    }

    /// 任务快照
    pub async fn status(&self, job_id: Uuid) -> Result<CrawlJob, OrchestratorError> {
        self.stores
            .jobs
            .find_job(job_id)
            .await?
            .ok_or(OrchestratorError::JobNotFound(job_id))
    }

    pub async fn items(&self, job_id: Uuid) -> Result<Vec<WorkItem>, OrchestratorError> {
        Ok(self.stores.jobs.find_items_by_job(job_id).await?)
    }

    /// 人工复核队列：因验证码失败的工作项
    pub async fn review_items(&self, job_id: Uuid) -> Result<Vec<WorkItem>, OrchestratorError> {
        let items = self.items(job_id).await?;
        Ok(items
            .into_iter()
            .filter(|item| item.failure_kind == Some(FailureKind::CaptchaDetected))
            .collect())
    }

    pub async fn links(&self, job_id: Uuid) -> Result<Vec<DiscoveredLink>, OrchestratorError> {
        Ok(self.stores.links.list_by_job(job_id).await?)
    }

    pub async fn attempts(&self, job_id: Uuid) -> Result<Vec<FetchAttempt>, OrchestratorError> {
        Ok(self.stores.attempts.list_by_job(job_id).await?)
    }

    /// 中止任务
    ///
    /// 任务立即进入 `failed`，排队中的工作项标记为中止；已派发的请求允许自然结束。
    /// 状态写入数据库，其他进程中的调度器在下次派发或收尾时看到
    pub async fn abort(&self, job_id: Uuid, reason: &str) -> Result<CrawlJob, OrchestratorError> {
        let job = self.status(job_id).await?.abort(reason)?;
        self.stores.jobs.update_job(&job).await?;

        let mut failed = 0;
        for item in self.items(job_id).await? {
            if item.status != ItemStatus::Queued {
                continue;
            }
            let aborted = item
                .clone()
                .fail(FailureKind::Aborted, Some(format!("aborted: {}", reason)));
            if self.stores.jobs.update_item_if(&aborted, &item, None).await? {
                failed += 1;
            }
        }

        counter!("jobs_terminal_total", "status" => JobStatus::Failed.as_str()).increment(1);
        warn!(job_id = %job_id, reason = %reason, items = failed, "Job aborted");
        Ok(job)
    }

    /// 强制重试
    ///
    /// 清除任务的检查点，所有工作项和任务回到 `queued`；任务累计尝试次数保留
    pub async fn force_retry(&self, job_id: Uuid) -> Result<CrawlJob, OrchestratorError> {
        let job = self.status(job_id).await?;

        let cleared = self.checkpoints.clear_job(job_id).await?;
        self.checkpoints.flush().await?;

        let items = self.items(job_id).await?;
        for item in &items {
            self.stores.jobs.update_item(&item.clone().reset()).await?;
        }

        let job = job.reset_for_retry();
        self.stores.jobs.update_job(&job).await?;

        info!(
            job_id = %job_id,
            items = items.len(),
            checkpoints = cleared,
            "Job reset for retry"
        );
        Ok(job)
    }

    /// 驱动所有活动任务直到没有可调度的工作
    ///
    /// 持久化层持续不可用时返回错误，已记录的结果不受影响
    pub async fn dispatch_pending(&self) -> Result<DispatchSummary, OrchestratorError> {
        let mut summary = DispatchSummary::default();

        self.checkpoints.load().await?;
        let mut queue = WorkQueue::new();
        let mut jobs = self.prepare(&mut queue, &mut summary).await?;

        if queue.is_empty() {
            self.save_proxy_states().await;
            return Ok(summary);
        }
        info!(items = queue.len(), jobs = jobs.len(), "Dispatching pending work");

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<AttemptResult> = JoinSet::new();
        let mut parked: HashMap<String, Vec<WorkItem>> = HashMap::new();

        loop {
            self.dispatch_ready(
                &semaphore,
                &mut queue,
                &mut parked,
                &mut tasks,
                &mut jobs,
                &mut summary,
            )
            .await?;

            if tasks.is_empty() {
                if !parked.is_empty() {
                    // domain held by another dispatcher on this limiter
                    for (domain, items) in parked.drain() {
                        let ready_at = Instant::now() + self.limiter.interval(&domain);
                        for item in items {
                            queue.push(item, ready_at);
                        }
                    }
                }
                match queue.next_ready_at() {
                    Some(ready_at) => {
                        sleep_until(ready_at).await;
                        continue;
                    }
                    None => break,
                }
            }

            let wake_at = if semaphore.available_permits() > 0 {
                queue.next_ready_at()
            } else {
                None
            };

            tokio::select! {
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok((item, outcome))) => {
                            if let Some(waiting) = parked.remove(&item.domain) {
                                for parked_item in waiting {
                                    queue.push_ready(parked_item);
                                }
                            }
                            self.complete(
                                item,
                                outcome,
                                &mut queue,
                                &mut parked,
                                &mut jobs,
                                &mut summary,
                            )
                            .await?;
                        }
                        Some(Err(e)) => {
                            counter!("worker_errors_total").increment(1);
                            error!("Fetch task was cancelled: {}", e);
                        }
                        None => {}
                    }
                }
                _ = sleep_until(wake_at.unwrap_or_else(Instant::now)), if wake_at.is_some() => {}
            }
        }

        self.checkpoints.flush().await?;
        self.save_proxy_states().await;

        info!(
            dispatched = summary.dispatched,
            succeeded = summary.succeeded,
            failed = summary.failed,
            retried = summary.retried,
            skipped = summary.skipped,
            "Dispatch run finished"
        );
        Ok(summary)
    }

    /// 读取活动任务，恢复中断的工作项，按检查点跳过已完成的工作项
    ///
    /// 仍在租期内的 running 工作项属于其他 worker，不做处理
    async fn prepare(
        &self,
        queue: &mut WorkQueue,
        summary: &mut DispatchSummary,
    ) -> Result<HashMap<Uuid, JobProgress>, OrchestratorError> {
        let mut jobs = HashMap::new();
        let stale_before = Utc::now() - to_chrono(self.config.stale_after);

        for job in self.stores.jobs.list_active_jobs().await? {
            let items = self.stores.jobs.find_items_by_job(job.id).await?;

            if self.config.force {
                let cleared = self.checkpoints.clear_job(job.id).await?;
                debug!(job_id = %job.id, cleared, "Forced refetch, checkpoints cleared");
            }

            for item in items {
                match item.status {
                    ItemStatus::Running if item.updated_at < stale_before => {
                        self.recover_interrupted(item, stale_before, queue, summary)
                            .await?;
                    }
                    ItemStatus::Running => {
                        debug!(job_id = %job.id, url = %item.url, "Item running on another worker");
                    }
                    _ if self.config.force => {
                        let reset = item.clone().reset();
                        if self.stores.jobs.update_item_if(&reset, &item, None).await? {
                            queue.push_ready(reset);
                        }
                    }
                    ItemStatus::Queued => {
                        if self.config.resume {
                            if let Some(entry) = self.checkpoints.get(job.id, &item.url).await? {
                                let restored = restore_from_checkpoint(item.clone(), &entry);
                                if self.stores.jobs.update_item_if(&restored, &item, None).await? {
                                    summary.skipped += 1;
                                    debug!(job_id = %job.id, url = %item.url, "Skipping checkpointed item");
                                }
                                continue;
                            }
                        }
                        let ready_at = instant_for(item.next_eligible_at);
                        queue.push(item, ready_at);
                    }
                    ItemStatus::Succeeded | ItemStatus::Failed => {}
                }
            }

            let mut progress = JobProgress::new(job);
            if progress.job.status == JobStatus::Running {
                progress.counted_in_progress = true;
                gauge!("jobs_in_progress").increment(1.0);
            }
            let job_id = progress.job.id;
            if self.finish_job_if_done(&mut progress, summary).await? {
                continue;
            }
            jobs.insert(job_id, progress);
        }

        Ok(jobs)
    }

    /// 上次运行未完成的尝试：记一次 `interrupted` 并按常规重试策略处理
    ///
    /// 条件更新保证多个 worker 中只有一个接手该工作项
    async fn recover_interrupted(
        &self,
        item: WorkItem,
        stale_before: DateTime<Utc>,
        queue: &mut WorkQueue,
        summary: &mut DispatchSummary,
    ) -> Result<(), OrchestratorError> {
        let outcome =
            PipelineOutcome::interrupted(&item, "worker stopped before the attempt finished");
        let attempts = item.attempts.max(0) as u32;
        let error = outcome.attempt.error.clone();

        let (next, delay) = match self
            .retry_policy
            .decide(AttemptOutcome::Interrupted.class(), attempts)
        {
            RetryDecision::RetryAfter(delay) => (
                item.clone().requeue(Utc::now() + to_chrono(delay), error),
                Some(delay),
            ),
            _ => (item.clone().fail(FailureKind::RetriesExhausted, error), None),
        };
        if !self
            .stores
            .jobs
            .update_item_if(&next, &item, Some(stale_before))
            .await?
        {
            debug!(job_id = %item.job_id, url = %item.url, "Interrupted item taken over elsewhere");
            return Ok(());
        }

        self.stores.attempts.append(&outcome.attempt).await?;
        counter!("fetch_attempts_total", "outcome" => AttemptOutcome::Interrupted.as_str())
            .increment(1);
        summary.interrupted += 1;

        match delay {
            Some(delay) => queue.push(next.clone(), Instant::now() + delay),
            None => self.record_checkpoint(checkpoint_for(&next, 0)).await,
        }
        warn!(job_id = %next.job_id, url = %next.url, "Recovered interrupted attempt");
        Ok(())
    }

    /// 在并发与域名准入允许的范围内派发就绪的工作项
    async fn dispatch_ready(
        &self,
        semaphore: &Arc<Semaphore>,
        queue: &mut WorkQueue,
        parked: &mut HashMap<String, Vec<WorkItem>>,
        tasks: &mut JoinSet<AttemptResult>,
        jobs: &mut HashMap<Uuid, JobProgress>,
        summary: &mut DispatchSummary,
    ) -> Result<(), OrchestratorError> {
        while !queue.is_empty() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some(item) = queue.pop_ready(Instant::now()) else {
                break;
            };
            if !jobs.contains_key(&item.job_id) {
                debug!(job_id = %item.job_id, url = %item.url, "Dropping item of inactive job");
                continue;
            }
            if self.job_closed(item.job_id).await? {
                self.drop_job(item.job_id, queue, parked, jobs);
                continue;
            }

            let admission = match self.limiter.try_admit(&item.domain) {
                Admission::Admitted(admission) => admission,
                Admission::NotBefore(ready_at) => {
                    queue.push(item, ready_at);
                    continue;
                }
                Admission::InFlight => {
                    parked.entry(item.domain.clone()).or_default().push(item);
                    continue;
                }
            };

            let proxy = match self.proxies.select() {
                Some(proxy) => Some(proxy),
                None if self.proxies.is_empty() || self.config.direct_fallback => None,
                None => {
                    let ready_at = self
                        .proxies
                        .next_available()
                        .unwrap_or_else(|| Instant::now() + self.config.persistence_retry);
                    debug!(url = %item.url, "{}, requeueing", CrawlError::ProxyUnavailable);
                    admission.revoke();
                    queue.push(item, ready_at);
                    continue;
                }
            };

            let claimed = item.clone().start()?;
            let won = self
                .persist("claim work item", || {
                    self.stores.jobs.update_item_if(&claimed, &item, None)
                })
                .await?;
            if !won {
                debug!(job_id = %item.job_id, url = %item.url, "Item claimed by another worker");
                admission.revoke();
                continue;
            }
            let item = claimed;

            // 认领与中止并发时以存储中的任务为准
            let current = self.current_job(item.job_id).await?;
            let Some(current) = current.filter(|job| !job.status.is_terminal()) else {
                let aborted = item.clone().fail(
                    FailureKind::Aborted,
                    Some("aborted: job closed before dispatch".to_string()),
                );
                self.persist("release work item", || {
                    self.stores.jobs.update_item_if(&aborted, &item, None)
                })
                .await?;
                admission.revoke();
                self.drop_job(item.job_id, queue, parked, jobs);
                continue;
            };

            self.persist("increment job attempts", || {
                self.stores.jobs.increment_job_attempts(item.job_id)
            })
            .await?;

            if let Some(progress) = jobs.get_mut(&item.job_id) {
                progress.job = current;
                progress.job.attempts += 1;
                if progress.job.status == JobStatus::Queued {
                    progress.job = progress.job.clone().start()?;
                    let job = progress.job.clone();
                    self.persist("start job", || self.stores.jobs.update_job(&job))
                        .await?;
                    progress.counted_in_progress = true;
                    gauge!("jobs_in_progress").increment(1.0);
                    info!(job_id = %job.id, "Job started");
                }
            }

            summary.dispatched += 1;
            self.spawn_attempt(tasks, item, proxy, admission, permit);
        }
        Ok(())
    }

    fn spawn_attempt(
        &self,
        tasks: &mut JoinSet<AttemptResult>,
        item: WorkItem,
        proxy: Option<String>,
        admission: AdmissionPermit,
        permit: OwnedSemaphorePermit,
    ) {
        let pipeline = self.pipeline.clone();
        let proxies = self.proxies.clone();
        let limiter = self.limiter.clone();
        let timeout = self.config.request_timeout;

        tasks.spawn(async move {
            let attempt = AssertUnwindSafe(async {
                let _permit = permit;
                let outcome = pipeline.fetch(&item, proxy.as_deref(), timeout).await;

                if let (Some(endpoint), Some(report)) = (&proxy, outcome.proxy_report) {
                    proxies.report(endpoint, report);
                }
                if let Some(delay) = outcome.crawl_delay {
                    limiter.raise_floor(&item.domain, delay);
                }
                if outcome.rate_limited {
                    limiter.penalize(&item.domain);
                } else if outcome.responded_normally() {
                    limiter.record_success(&item.domain);
                }
                drop(admission);
                outcome
            })
            .catch_unwind()
            .await;
            (item, attempt.ok())
        });
    }

    /// 处理一次尝试的结果
    ///
    /// 顺序：追加尝试记录 → 写入链接 → 重试决策 → 终态时写检查点 → 更新工作项 → 汇总任务
    #[instrument(skip_all, fields(job_id = %item.job_id, url = %item.url))]
    async fn complete(
        &self,
        item: WorkItem,
        outcome: Option<PipelineOutcome>,
        queue: &mut WorkQueue,
        parked: &mut HashMap<String, Vec<WorkItem>>,
        jobs: &mut HashMap<Uuid, JobProgress>,
        summary: &mut DispatchSummary,
    ) -> Result<(), OrchestratorError> {
        let outcome = outcome.unwrap_or_else(|| {
            counter!("worker_errors_total").increment(1);
            error!("Fetch task panicked");
            PipelineOutcome::interrupted(&item, "fetch task panicked")
        });
        let attempt = &outcome.attempt;

        self.persist("append fetch attempt", || self.stores.attempts.append(attempt))
            .await?;
        counter!("fetch_attempts_total", "outcome" => attempt.outcome.as_str()).increment(1);
        histogram!("fetch_latency_seconds").record(attempt.response_time_ms as f64 / 1000.0);

        let mut link_count = 0;
        if attempt.success {
            let links: Vec<DiscoveredLink> = outcome
                .links
                .iter()
                .map(|link| {
                    let source = item.url.clone();
                    DiscoveredLink::new(item.job_id, link.url.clone(), link.network, source)
                })
                .collect();
            let present: Vec<String> = links.iter().map(|link| link.url.clone()).collect();

            if !links.is_empty() {
                self.persist("upsert links", || self.stores.links.upsert_links(&links))
                    .await?;
            }
            self.persist("deactivate missing links", || {
                self.stores.links.deactivate_missing(item.job_id, &item.url, &present)
            })
            .await?;

            for link in &links {
                counter!("links_discovered_total", "network" => link.network.as_str())
                    .increment(1);
            }
            link_count = links.len();
        }

        // 任务可能已在其他进程中被中止
        let closed = self.job_closed(item.job_id).await?;
        if closed {
            self.drop_job(item.job_id, queue, parked, jobs);
        }
        let running = item.clone();
        let error = attempt.error.clone();
        let attempts_made = item.attempts.max(0) as u32;

        let item = match self.retry_policy.decide(attempt.outcome.class(), attempts_made) {
            RetryDecision::Done => {
                summary.succeeded += 1;
                info!(links = link_count, "Item succeeded");
                item.succeed()
            }
            RetryDecision::RetryAfter(_) if closed => {
                summary.failed += 1;
                let reason = "aborted: job aborted while in flight".to_string();
                item.fail(FailureKind::Aborted, Some(reason))
            }
            RetryDecision::RetryAfter(delay) => {
                summary.retried += 1;
                debug!(attempt = attempts_made, "Retrying in {:?}", delay);
                let item = item.requeue(Utc::now() + to_chrono(delay), error);
                queue.push(item.clone(), Instant::now() + delay);
                item
            }
            RetryDecision::GiveUp { exhausted } => {
                summary.failed += 1;
                let kind = if exhausted {
                    FailureKind::RetriesExhausted
                } else {
                    failure_kind_for(attempt.outcome)
                };
                warn!(
                    kind = %kind,
                    "Item failed: {}",
                    error.as_deref().unwrap_or("unknown error")
                );
                item.fail(kind, error)
            }
        };

        if item.status.is_terminal() && item.failure_kind != Some(FailureKind::Aborted) {
            self.record_checkpoint(checkpoint_for(&item, link_count)).await;
        }

        let written = self
            .persist("update work item", || {
                self.stores.jobs.update_item_if(&item, &running, None)
            })
            .await?;
        if !written {
            warn!("Item was taken over by another worker, result kept only as an attempt");
            return Ok(());
        }

        if let Some(progress) = jobs.get_mut(&item.job_id) {
            if self.finish_job_if_done(progress, summary).await? {
                jobs.remove(&item.job_id);
            }
        }
        Ok(())
    }

    async fn current_job(&self, job_id: Uuid) -> Result<Option<CrawlJob>, OrchestratorError> {
        Ok(self.persist("read job", || self.stores.jobs.find_job(job_id)).await?)
    }

    /// 任务在存储中已结束（中止或被其他 worker 收尾）或已不存在
    async fn job_closed(&self, job_id: Uuid) -> Result<bool, OrchestratorError> {
        let job = self.current_job(job_id).await?;
        Ok(job.map_or(true, |job| job.status.is_terminal()))
    }

    /// 丢弃已结束任务在本轮调度中剩余的工作项
    fn drop_job(
        &self,
        job_id: Uuid,
        queue: &mut WorkQueue,
        parked: &mut HashMap<String, Vec<WorkItem>>,
        jobs: &mut HashMap<Uuid, JobProgress>,
    ) {
        let mut dropped = queue.remove_job(job_id).len();
        parked.retain(|_, items| {
            let before = items.len();
            items.retain(|item| item.job_id != job_id);
            dropped += before - items.len();
            !items.is_empty()
        });

        if let Some(progress) = jobs.remove(&job_id) {
            if progress.counted_in_progress {
                gauge!("jobs_in_progress").decrement(1.0);
            }
            info!(job_id = %job_id, dropped, "Job closed, no further dispatch");
        }
    }

    /// 所有工作项结束时汇总任务终态，返回任务是否已结束
    ///
    /// 以存储中的工作项为准，多个 worker 分担同一任务时由最后完成的一方收尾
    async fn finish_job_if_done(
        &self,
        progress: &mut JobProgress,
        summary: &mut DispatchSummary,
    ) -> Result<bool, OrchestratorError> {
        let items = self.stores.jobs.find_items_by_job(progress.job.id).await?;
        let Some(status) = aggregate_items(&items) else {
            return Ok(false);
        };

        let current = self.current_job(progress.job.id).await?;
        let Some(current) = current.filter(|job| !job.status.is_terminal()) else {
            if progress.counted_in_progress {
                gauge!("jobs_in_progress").decrement(1.0);
                progress.counted_in_progress = false;
            }
            return Ok(true);
        };

        let job = current.finish(status, last_failure(&items))?;
        self.persist("finish job", || self.stores.jobs.update_job(&job))
            .await?;
        progress.job = job;

        if progress.counted_in_progress {
            gauge!("jobs_in_progress").decrement(1.0);
            progress.counted_in_progress = false;
        }
        counter!("jobs_terminal_total", "status" => status.as_str()).increment(1);
        summary.jobs_finished += 1;
        info!(job_id = %progress.job.id, status = %status, "Job finished");
        Ok(true)
    }

    /// 写检查点，失败时暂停并持续重试直到存储恢复
    async fn record_checkpoint(&self, entry: CheckpointEntry) {
        let mut attempt: u32 = 0;
        loop {
            match self.checkpoints.record(entry.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    attempt += 1;
                    counter!("worker_errors_total").increment(1);
                    let error = CrawlError::CheckpointWriteFailure(e.to_string());
                    error!(
                        job_id = %entry.job_id,
                        url = %entry.url,
                        attempt,
                        "{}, dispatch paused",
                        error
                    );
                    sleep(self.config.persistence_retry).await;
                }
            }
        }
    }

    /// 仓库写入，失败时按固定间隔重试有限次数
    async fn persist<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < PERSIST_ATTEMPTS => {
                    counter!("worker_errors_total").increment(1);
                    warn!(attempt, "Failed to {}: {}", what, e);
                    sleep(self.config.persistence_retry).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Giving up on {} after {} attempts: {}", what, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn save_proxy_states(&self) {
        let Some(repository) = &self.stores.proxies else {
            return;
        };
        if self.proxies.is_empty() {
            return;
        }
        if let Err(e) = repository.save_states(&self.proxies.snapshot()).await {
            warn!("Failed to persist proxy health: {}", e);
        }
    }
}

fn failure_kind_for(outcome: AttemptOutcome) -> FailureKind {
    match outcome {
        AttemptOutcome::RobotsDisallowed => FailureKind::RobotsDisallowed,
        AttemptOutcome::CaptchaDetected => FailureKind::CaptchaDetected,
        AttemptOutcome::PermanentHttp => FailureKind::PermanentHttp,
        _ => FailureKind::RetriesExhausted,
    }
}

/// 终态工作项的检查点；失败时摘要记录失败类别
fn checkpoint_for(item: &WorkItem, link_count: usize) -> CheckpointEntry {
    match item.status {
        ItemStatus::Succeeded => CheckpointEntry::new(
            item.job_id,
            item.url.clone(),
            CheckpointOutcome::Succeeded,
            Some(format!("{} links", link_count)),
        ),
        _ => CheckpointEntry::new(
            item.job_id,
            item.url.clone(),
            CheckpointOutcome::Failed,
            item.failure_kind.map(|kind| kind.as_str().to_string()),
        ),
    }
}

fn restore_from_checkpoint(item: WorkItem, entry: &CheckpointEntry) -> WorkItem {
    match entry.outcome {
        CheckpointOutcome::Succeeded => item.succeed(),
        CheckpointOutcome::Failed => {
            let kind = entry
                .summary
                .as_deref()
                .and_then(|summary| FailureKind::from_str(summary).ok())
                .unwrap_or(FailureKind::RetriesExhausted);
            item.fail(kind, None)
        }
    }
}

fn instant_for(at: Option<DateTime<Utc>>) -> Instant {
    let now = Instant::now();
    at.and_then(|at| (at - Utc::now()).to_std().ok())
        .map(|delay| now + delay)
        .unwrap_or(now)
}

fn to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}
