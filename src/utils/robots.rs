// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Result;
use dashmap::DashMap;
use reqwest::Client;
use robotstxt::DefaultMatcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use async_trait::async_trait;

use crate::utils::retry_policy::RetryPolicy;

/// robots.txt 缓存时长
const ROBOTS_TTL: Duration = Duration::from_secs(3600);

/// Robots.txt检查器接口
#[async_trait]
pub trait RobotsCheckerTrait: Send + Sync {
    /// 检查URL是否被允许访问
    async fn is_allowed(&self, url_str: &str, user_agent: &str) -> Result<bool>;
    /// 获取爬取延迟
    async fn get_crawl_delay(&self, url_str: &str, user_agent: &str) -> Result<Option<Duration>>;
}

/// 缓存的Robots.txt内容
#[derive(Clone)]
struct CachedRobots {
    /// 内容
    content: String,

    /// 过期时间
    expires_at: Instant,
}

/// Robots.txt检查器
///
/// 按源站（scheme://host:port）缓存 robots.txt 一小时。
/// 404 或其它 4xx 视为全部允许；持续的网络错误或 5xx 同样视为允许并记录告警。
#[derive(Clone)]
pub struct RobotsChecker {
    /// HTTP客户端
    client: Client,

    /// 内存缓存
    cache: Arc<DashMap<String, CachedRobots>>,

    /// 重试策略
    retry_policy: RetryPolicy,

    /// 抓取 robots.txt 时使用的 User-Agent
    user_agent: String,
}

#[async_trait]
impl RobotsCheckerTrait for RobotsChecker {
    async fn is_allowed(&self, url_str: &str, user_agent: &str) -> Result<bool> {
        let content = self.get_robots_content(url_str).await?;
        if content.trim().is_empty() {
            return Ok(true);
        }
        let mut matcher = DefaultMatcher::default();
        Ok(matcher.one_agent_allowed_by_robots(&content, user_agent, url_str))
    }

    async fn get_crawl_delay(&self, url_str: &str, user_agent: &str) -> Result<Option<Duration>> {
        let content = self.get_robots_content(url_str).await?;
        Ok(parse_crawl_delay(&content, user_agent))
    }
}

impl RobotsChecker {
    /// 创建新的Robots检查器实例
    ///
    /// # 参数
    ///
    /// * `user_agent` - 抓取 robots.txt 使用的 User-Agent
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            cache: Arc::new(DashMap::new()),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(500),
                max_backoff: Duration::from_secs(5),
                ..Default::default()
            },
            user_agent: user_agent.into(),
        }
    }

    /// 覆盖抓取 robots.txt 的重试策略
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// 获取Robots.txt内容（带缓存）
    async fn get_robots_content(&self, url_str: &str) -> Result<String> {
        let url = Url::parse(url_str)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid URL: {}", url_str))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let robots_url = format!("{}://{}:{}/robots.txt", url.scheme(), host, port);

        if let Some(cached) = self.cache.get(&robots_url) {
            if cached.expires_at > Instant::now() {
                return Ok(cached.content.clone());
            }
        }

        let content = self.fetch_robots(&robots_url).await;

        self.cache.insert(
            robots_url,
            CachedRobots {
                content: content.clone(),
                expires_at: Instant::now() + ROBOTS_TTL,
            },
        );

        Ok(content)
    }

    /// 抓取 robots.txt，失败时返回空内容（即全部允许）
    async fn fetch_robots(&self, robots_url: &str) -> String {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < self.retry_policy.max_attempts {
            attempt += 1;
            let response = self
                .client
                .get(robots_url)
                .header("User-Agent", &self.user_agent)
                .timeout(Duration::from_secs(5))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.unwrap_or_default();
                }
                Ok(resp) if resp.status().is_server_error() => {
                    last_error = Some(format!("server error: {}", resp.status()));
                }
                // 404/403 等 4xx：没有可用的 robots.txt
                Ok(_) => return String::new(),
                Err(e) => {
                    last_error = Some(format!("request failed: {}", e));
                }
            }

            if attempt < self.retry_policy.max_attempts {
                tokio::time::sleep(self.retry_policy.calculate_backoff(attempt)).await;
            }
        }

        if let Some(err) = last_error {
            tracing::warn!("Failed to fetch robots.txt from {}: {}", robots_url, err);
        }
        String::new()
    }
}

/// 解析Crawl-delay指令
///
/// 优先使用匹配 User-Agent 的分组，否则回退到 `*` 分组
fn parse_crawl_delay(content: &str, user_agent: &str) -> Option<Duration> {
    let mut current_agent_matched = false;
    let mut delay: Option<f64> = None;
    let mut specific_agent_found = false;
    let user_agent = user_agent.to_lowercase();

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        if key == "user-agent" {
            if value == "*" {
                current_agent_matched = !specific_agent_found;
            } else if user_agent.contains(&value.to_lowercase()) {
                current_agent_matched = true;
                if !specific_agent_found {
                    specific_agent_found = true;
                    delay = None;
                }
            } else {
                current_agent_matched = false;
            }
        } else if key == "crawl-delay" && current_agent_matched {
            if let Ok(d) = value.parse::<f64>() {
                if d.is_finite() && d >= 0.0 {
                    delay = Some(d);
                }
            }
        }
    }

    delay.map(Duration::from_secs_f64)
}
