// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::domain::models::fetch_attempt::{truncate_error, AttemptOutcome, FetchAttempt};
use crate::domain::models::work_item::WorkItem;
use crate::domain::services::link_extractor::{
    ExtractedLink, LinkExtractor, SocialLinkExtractor,
};
use crate::domain::services::page_heuristics::{DefaultPageInspector, PageInspector};
use crate::engines::proxy_manager::ProxyReport;
use crate::engines::traits::{EngineError, FetchEngine, FetchRequest, RenderEngine};
use crate::utils::errors::CrawlError;
use crate::utils::robots::RobotsCheckerTrait;
use crate::utils::url_utils::redact_proxy;

/// 单次抓取的完整结果
///
/// 抓取流水线从不返回错误，所有失败都体现在 `attempt` 与 `error` 中
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// 待追加的尝试记录
    pub attempt: FetchAttempt,
    /// 提取到的社交链接（仅成功时非空）
    pub links: Vec<ExtractedLink>,
    pub error: Option<CrawlError>,
    /// robots.txt 声明的 Crawl-delay
    pub crawl_delay: Option<Duration>,
    /// 目标返回了 429
    pub rate_limited: bool,
    /// 需要上报给代理管理器的结果
    pub proxy_report: Option<ProxyReport>,
}

impl PipelineOutcome {
    fn new(attempt: FetchAttempt) -> Self {
        Self {
            attempt,
            links: Vec::new(),
            error: None,
            crawl_delay: None,
            rate_limited: false,
            proxy_report: None,
        }
    }

    /// 尝试未能正常结束（进程退出或任务崩溃）
    pub fn interrupted(item: &WorkItem, reason: impl Into<String>) -> Self {
        let attempt = FetchAttempt::new(item.job_id, item.id, &item.url, AttemptOutcome::Interrupted)
            .with_error(reason);
        Self::new(attempt)
    }

    /// 目标站点给出了非 429 的应答
    pub fn responded_normally(&self) -> bool {
        self.attempt.status_code.is_some() && !self.rate_limited
    }
}

struct RenderSettings {
    engine: Arc<dyn RenderEngine>,
    timeout: Duration,
}

/// 抓取流水线
///
/// robots 检查 → 请求 → 状态分类 → 验证码检测 → 链接提取 → 按需渲染升级
pub struct FetchPipeline {
    engine: Arc<dyn FetchEngine>,
    robots: Arc<dyn RobotsCheckerTrait>,
    renderer: Option<RenderSettings>,
    inspector: Arc<dyn PageInspector>,
    extractor: Arc<dyn LinkExtractor>,
    user_agent: String,
}

impl FetchPipeline {
    pub fn new(
        engine: Arc<dyn FetchEngine>,
        robots: Arc<dyn RobotsCheckerTrait>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            robots,
            renderer: None,
            inspector: Arc::new(DefaultPageInspector::default()),
            extractor: Arc::new(SocialLinkExtractor),
            user_agent: user_agent.into(),
        }
    }

    /// 启用渲染升级
    pub fn with_renderer(mut self, engine: Arc<dyn RenderEngine>, timeout: Duration) -> Self {
        self.renderer = Some(RenderSettings { engine, timeout });
        self
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn PageInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn LinkExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// 对工作项执行一次抓取尝试
    ///
    /// # 参数
    ///
    /// * `item` - 工作项
    /// * `proxy` - 使用的代理，`None` 为直连
    /// * `timeout` - 单次请求超时
    #[instrument(
        skip(self, item, proxy),
        fields(job_id = %item.job_id, url = %item.url, domain = %item.domain)
    )]
    pub async fn fetch(
        &self,
        item: &WorkItem,
        proxy: Option<&str>,
        timeout: Duration,
    ) -> PipelineOutcome {
        let start = Instant::now();

        let allowed = match self.robots.is_allowed(&item.url, &self.user_agent).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!("robots.txt check failed, allowing fetch: {}", e);
                true
            }
        };
        if !allowed {
            debug!("Blocked by robots.txt");
            let error = CrawlError::RobotsDisallowed(item.url.clone());
            let attempt = FetchAttempt::new(
                item.job_id,
                item.id,
                &item.url,
                AttemptOutcome::RobotsDisallowed,
            )
            .with_error(error.to_string());
            let mut outcome = PipelineOutcome::new(attempt);
            outcome.error = Some(error);
            return outcome;
        }

        let crawl_delay = match self.robots.get_crawl_delay(&item.url, &self.user_agent).await {
            Ok(delay) => delay,
            Err(e) => {
                debug!("Failed to read crawl delay: {}", e);
                None
            }
        };

        let request = FetchRequest {
            url: item.url.clone(),
            proxy: proxy.map(str::to_string),
            timeout,
            user_agent: self.user_agent.clone(),
        };

        let mut outcome = match self.engine.fetch(&request).await {
            Ok(response) => {
                let (result, proxy_report) = classify_status(response.status_code);
                let mut attempt =
                    FetchAttempt::new(item.job_id, item.id, &item.url, AttemptOutcome::Success);
                attempt.status_code = Some(i32::from(response.status_code));

                let mut outcome = PipelineOutcome::new(attempt);
                outcome.proxy_report = proxy.map(|_| proxy_report);
                outcome.rate_limited = response.status_code == 429;

                let captcha_candidate = result.is_ok() || response.status_code == 403;
                if captcha_candidate && self.inspector.looks_like_captcha(&response.content) {
                    let error = CrawlError::CaptchaDetected(item.url.clone());
                    set_failure(&mut outcome, AttemptOutcome::CaptchaDetected, error);
                } else if let Err((kind, error)) = result {
                    set_failure(&mut outcome, kind, error);
                } else if !is_markup(&response.content_type) {
                    debug!(content_type = %response.content_type, "Body is not markup, no links to extract");
                } else {
                    let base = Url::parse(&response.final_url)
                        .or_else(|_| Url::parse(&item.url))
                        .ok();
                    if let Some(base) = base {
                        outcome.links = self.extractor.extract(&response.content, &base);
                        if outcome.links.is_empty()
                            && self.inspector.is_js_heavy(&response.content)
                        {
                            self.escalate(&mut outcome, &item.url, &base).await;
                        }
                    }
                }
                outcome
            }
            Err(e) => {
                let (kind, error, report) = classify_engine_error(&e);
                let attempt = FetchAttempt::new(item.job_id, item.id, &item.url, kind);
                let mut outcome = PipelineOutcome::new(attempt);
                outcome.proxy_report = proxy.map(|_| report);
                set_failure(&mut outcome, kind, error);
                outcome
            }
        };

        outcome.crawl_delay = crawl_delay;
        outcome.attempt.proxy = proxy.map(redact_proxy);
        outcome.attempt.response_time_ms = start.elapsed().as_millis() as i64;

        debug!(
            outcome = %outcome.attempt.outcome,
            status = ?outcome.attempt.status_code,
            links = outcome.links.len(),
            "Fetch attempt finished"
        );
        outcome
    }

    /// 渲染升级：渲染结果作为有效响应，失败时保留原始结果
    async fn escalate(&self, outcome: &mut PipelineOutcome, url: &str, base: &Url) {
        let Some(renderer) = &self.renderer else {
            return;
        };

        match renderer.engine.render(url, renderer.timeout).await {
            Ok(page) => {
                outcome.links = self.extractor.extract(&page.content, base);
                outcome.attempt.rendered = true;
                debug!(
                    engine = renderer.engine.name(),
                    links = outcome.links.len(),
                    "Rendered page"
                );
            }
            Err(e) => {
                let error = CrawlError::RenderFailure(e.to_string());
                warn!("{}, keeping raw response", error);
            }
        }
    }
}

/// 是否为可解析链接的文本类响应（缺省按 HTML 处理）
fn is_markup(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime.starts_with("text/") || mime == "application/xhtml+xml"
}

fn set_failure(outcome: &mut PipelineOutcome, kind: AttemptOutcome, error: CrawlError) {
    outcome.attempt.outcome = kind;
    outcome.attempt.success = false;
    outcome.attempt.error = Some(truncate_error(error.to_string()));
    outcome.links.clear();
    outcome.error = Some(error);
}

/// HTTP 状态码分类
///
/// 2xx/3xx 成功；429、5xx 与 407 可重试；其余 4xx 为终态
fn classify_status(status: u16) -> (Result<(), (AttemptOutcome, CrawlError)>, ProxyReport) {
    match status {
        200..=399 => (Ok(()), ProxyReport::Success),
        407 => (
            Err((
                AttemptOutcome::TransientNetwork,
                CrawlError::TransientNetwork("proxy authentication required (407)".to_string()),
            )),
            ProxyReport::Fatal,
        ),
        429 => (
            Err((
                AttemptOutcome::TransientNetwork,
                CrawlError::TransientNetwork("too many requests (429)".to_string()),
            )),
            ProxyReport::Success,
        ),
        400..=499 => (
            Err((
                AttemptOutcome::PermanentHttp,
                CrawlError::PermanentHttp {
                    status,
                    message: "client error".to_string(),
                },
            )),
            ProxyReport::Success,
        ),
        _ => (
            Err((
                AttemptOutcome::TransientNetwork,
                CrawlError::TransientNetwork(format!("server returned {}", status)),
            )),
            ProxyReport::Success,
        ),
    }
}

/// 引擎错误分类
///
/// 超时、连接失败可重试；TLS 错误为终态；代理配置错误隔离该代理后重试
fn classify_engine_error(error: &EngineError) -> (AttemptOutcome, CrawlError, ProxyReport) {
    match error {
        EngineError::InvalidProxy(message) => (
            AttemptOutcome::TransientNetwork,
            CrawlError::TransientNetwork(format!("invalid proxy: {}", message)),
            ProxyReport::Fatal,
        ),
        e if e.is_tls_failure() => (
            AttemptOutcome::PermanentHttp,
            // no HTTP status was received
            CrawlError::PermanentHttp {
                status: 0,
                message: e.to_string(),
            },
            ProxyReport::Success,
        ),
        e if e.is_retryable() => (
            AttemptOutcome::TransientNetwork,
            CrawlError::TransientNetwork(e.to_string()),
            ProxyReport::Failure,
        ),
        e => (
            AttemptOutcome::PermanentHttp,
            CrawlError::PermanentHttp {
                status: 0,
                message: e.to_string(),
            },
            ProxyReport::Failure,
        ),
    }
}

#[cfg(test)]
#[path = "fetch_pipeline_test.rs"]
mod tests;
