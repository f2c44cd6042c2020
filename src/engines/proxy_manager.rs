// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::{counter, gauge};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::models::proxy::{Proxy, ProxyHealth};
use crate::utils::url_utils::redact_proxy;

/// 代理健康策略
#[derive(Clone, Debug)]
pub struct ProxyPolicy {
    /// 连续失败多少次后降级
    pub degrade_threshold: u32,
    /// 连续失败多少次后隔离
    pub quarantine_threshold: u32,
    /// 隔离冷却时间
    pub cooldown: Duration,
}

impl Default for ProxyPolicy {
    fn default() -> Self {
        Self {
            degrade_threshold: 3,
            quarantine_threshold: 5,
            cooldown: Duration::from_secs(900),
        }
    }
}

/// 一次使用代理后的结果上报
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyReport {
    Success,
    Failure,
    /// 代理认证被拒等致命错误，直接隔离
    Fatal,
}

#[derive(Debug, Clone)]
struct ProxyEntry {
    health: ProxyHealth,
    consecutive_failures: u32,
    last_used: Option<Instant>,
    last_used_at: Option<DateTime<Utc>>,
    quarantined_until: Option<Instant>,
}

impl ProxyEntry {
    fn healthy() -> Self {
        Self {
            health: ProxyHealth::Healthy,
            consecutive_failures: 0,
            last_used: None,
            last_used_at: None,
            quarantined_until: None,
        }
    }

    /// 冷却结束的隔离代理进入观察期
    fn refresh(&mut self, now: Instant, policy: &ProxyPolicy) {
        if self.health != ProxyHealth::Quarantined {
            return;
        }
        if self.quarantined_until.is_some_and(|until| until <= now) {
            self.health = ProxyHealth::Degraded;
            self.quarantined_until = None;
            // one more failure on probation sends it straight back
            self.consecutive_failures = policy.quarantine_threshold.saturating_sub(1);
        }
    }
}

/// 代理管理器
///
/// 每个代理独立加锁（DashMap 分片），选择时按最近最少使用排序
#[derive(Clone)]
pub struct ProxyManager {
    entries: Arc<DashMap<String, ProxyEntry>>,
    policy: ProxyPolicy,
}

impl ProxyManager {
    /// 创建代理管理器
    ///
    /// # 参数
    ///
    /// * `endpoints` - 代理地址列表，重复项会被合并
    /// * `policy` - 健康策略
    pub fn new<I, S>(endpoints: I, policy: ProxyPolicy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let manager = Self {
            entries: Arc::new(DashMap::new()),
            policy,
        };
        for endpoint in endpoints {
            manager.add(endpoint);
        }
        manager
    }

    /// 从持久化快照恢复，隔离状态按剩余冷却时间继续生效
    pub fn from_snapshot(proxies: Vec<Proxy>, policy: ProxyPolicy) -> Self {
        let manager = Self::new(Vec::<String>::new(), policy);
        let now = Instant::now();
        let wall_now = Utc::now();

        for proxy in proxies {
            let quarantined_until = match proxy.health {
                ProxyHealth::Quarantined => {
                    let remaining = proxy
                        .quarantined_until
                        .and_then(|until| (until - wall_now).to_std().ok())
                        .unwrap_or(Duration::ZERO);
                    Some(now + remaining)
                }
                _ => None,
            };
            manager.entries.insert(
                proxy.endpoint,
                ProxyEntry {
                    health: proxy.health,
                    consecutive_failures: proxy.consecutive_failures,
                    last_used: None,
                    last_used_at: proxy.last_used_at,
                    quarantined_until,
                },
            );
        }
        manager.update_gauge();
        manager
    }

    /// 添加代理，已存在时保留原有状态
    pub fn add(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return;
        }
        self.entries
            .entry(endpoint.to_string())
            .or_insert_with(ProxyEntry::healthy);
        self.update_gauge();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 选择一个可用代理
    ///
    /// # 返回值
    ///
    /// * `Some(endpoint)` - 最近最少使用的可用代理
    /// * `None` - 没有可用代理（全部隔离或代理池为空）
    pub fn select(&self) -> Option<String> {
        let now = Instant::now();
        let mut best: Option<(Option<Instant>, String)> = None;

        for mut entry in self.entries.iter_mut() {
            entry.refresh(now, &self.policy);
            if entry.health == ProxyHealth::Quarantined {
                continue;
            }
            let candidate = (entry.last_used, entry.key().clone());
            match &best {
                Some(current) if *current <= candidate => {}
                _ => best = Some(candidate),
            }
        }

        let (_, endpoint) = best?;
        if let Some(mut entry) = self.entries.get_mut(&endpoint) {
            entry.last_used = Some(now);
            entry.last_used_at = Some(Utc::now());
        }
        Some(endpoint)
    }

    /// 上报代理使用结果并推进健康状态机
    pub fn report(&self, endpoint: &str, report: ProxyReport) {
        let Some(mut entry) = self.entries.get_mut(endpoint) else {
            debug!("Ignoring report for unknown proxy {}", redact_proxy(endpoint));
            return;
        };

        let before = entry.health;
        match report {
            ProxyReport::Success => {
                entry.consecutive_failures = 0;
                entry.health = ProxyHealth::Healthy;
                entry.quarantined_until = None;
            }
            ProxyReport::Failure => {
                entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
                if entry.consecutive_failures >= self.policy.quarantine_threshold {
                    entry.health = ProxyHealth::Quarantined;
                } else if entry.consecutive_failures >= self.policy.degrade_threshold {
                    entry.health = ProxyHealth::Degraded;
                }
            }
            ProxyReport::Fatal => {
                entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
                entry.health = ProxyHealth::Quarantined;
            }
        }

        if entry.health == ProxyHealth::Quarantined && before != ProxyHealth::Quarantined {
            entry.quarantined_until = Some(Instant::now() + self.policy.cooldown);
            counter!("proxy_quarantined_total").increment(1);
            warn!(
                proxy = %redact_proxy(endpoint),
                failures = entry.consecutive_failures,
                "Proxy quarantined for {:?}",
                self.policy.cooldown
            );
        } else if entry.health != before {
            debug!(
                proxy = %redact_proxy(endpoint),
                "Proxy health {} -> {}",
                before,
                entry.health
            );
        }
        drop(entry);
        self.update_gauge();
    }

    /// 当前健康状态
    pub fn health(&self, endpoint: &str) -> Option<ProxyHealth> {
        let now = Instant::now();
        self.entries.get_mut(endpoint).map(|mut entry| {
            entry.refresh(now, &self.policy);
            entry.health
        })
    }

    /// 最早有代理结束隔离的时间，代理池为空时返回 `None`
    pub fn next_available(&self) -> Option<Instant> {
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;
        for entry in self.entries.iter() {
            let at = match entry.health {
                ProxyHealth::Quarantined => entry.quarantined_until.unwrap_or(now),
                _ => now,
            };
            earliest = Some(earliest.map_or(at, |e| e.min(at)));
        }
        earliest
    }

    /// 导出当前状态用于持久化
    pub fn snapshot(&self) -> Vec<Proxy> {
        let now = Instant::now();
        let wall_now = Utc::now();
        let mut proxies: Vec<Proxy> = self
            .entries
            .iter()
            .map(|entry| {
                let quarantined_until = entry.quarantined_until.map(|until| {
                    let remaining = until.saturating_duration_since(now);
                    wall_now + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
                });
                Proxy {
                    endpoint: entry.key().clone(),
                    health: entry.health,
                    consecutive_failures: entry.consecutive_failures,
                    last_used_at: entry.last_used_at,
                    quarantined_until,
                }
            })
            .collect();
        proxies.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        proxies
    }

    fn update_gauge(&self) {
        let quarantined = self
            .entries
            .iter()
            .filter(|e| e.health == ProxyHealth::Quarantined)
            .count();
        gauge!("proxies_quarantined").set(quarantined as f64);
    }
}
