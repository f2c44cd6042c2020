// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// 域名限流策略
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// 同一域名两次请求的最小间隔
    pub base_interval: Duration,
    /// 收到 429 时间隔放大倍数
    pub penalty_multiplier: f64,
    /// 间隔上限
    pub max_interval: Duration,
    /// 连续多少次非 429 成功后回收一次惩罚
    pub recovery_successes: u32,
    /// 每次回收时间隔的缩放倍数
    pub recovery_multiplier: f64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(2),
            penalty_multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            recovery_successes: 3,
            recovery_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone)]
struct DomainSlot {
    last_dispatch: Option<Instant>,
    in_flight: bool,
    interval: Duration,
    /// 间隔下限，robots.txt 的 Crawl-delay 会抬高它
    floor: Duration,
    clean_successes: u32,
}

impl DomainSlot {
    fn new(policy: &RateLimitPolicy) -> Self {
        Self {
            last_dispatch: None,
            in_flight: false,
            interval: policy.base_interval,
            floor: policy.base_interval,
            clean_successes: 0,
        }
    }
}

/// 准入结果
#[derive(Debug)]
pub enum Admission {
    /// 已准入，持有许可直到请求结束
    Admitted(AdmissionPermit),
    /// 间隔未到，最早可调度时间
    NotBefore(Instant),
    /// 该域名已有请求在途
    InFlight,
}

/// 域名限流器
///
/// 每个域名一条独立记录，准入检查与更新在同一分片锁内完成
#[derive(Debug, Clone)]
pub struct DomainRateLimiter {
    slots: Arc<DashMap<String, DomainSlot>>,
    policy: RateLimitPolicy,
}

impl DomainRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            policy,
        }
    }

    /// 尝试为域名申请一次请求准入
    ///
    /// 准入时立即记录调度时间并标记在途，避免多个 worker 同时越过检查
    pub fn try_admit(&self, domain: &str) -> Admission {
        let now = Instant::now();
        let mut slot = self
            .slots
            .entry(domain.to_string())
            .or_insert_with(|| DomainSlot::new(&self.policy));

        if slot.in_flight {
            return Admission::InFlight;
        }
        if let Some(last) = slot.last_dispatch {
            let ready_at = last + slot.interval;
            if now < ready_at {
                return Admission::NotBefore(ready_at);
            }
        }

        let previous = slot.last_dispatch;
        slot.last_dispatch = Some(now);
        slot.in_flight = true;

        Admission::Admitted(AdmissionPermit {
            limiter: self.clone(),
            domain: domain.to_string(),
            previous,
            released: false,
        })
    }

    /// 请求结束后释放域名
    pub fn release(&self, domain: &str) {
        if let Some(mut slot) = self.slots.get_mut(domain) {
            slot.in_flight = false;
        }
    }

    /// 收到 429 后放大该域名的间隔
    pub fn penalize(&self, domain: &str) {
        let mut slot = self
            .slots
            .entry(domain.to_string())
            .or_insert_with(|| DomainSlot::new(&self.policy));

        let widened = slot.interval.mul_f64(self.policy.penalty_multiplier.max(1.0));
        slot.interval = widened.min(self.policy.max_interval).max(slot.floor);
        slot.clean_successes = 0;

        counter!("domain_rate_limit_penalties_total").increment(1);
        warn!(domain = %domain, "Rate limited by target, interval widened to {:?}", slot.interval);
    }

    /// 记录一次非 429 的成功响应，连续成功足够多次后逐步回收惩罚
    pub fn record_success(&self, domain: &str) {
        let Some(mut slot) = self.slots.get_mut(domain) else {
            return;
        };
        if slot.interval <= slot.floor {
            slot.clean_successes = 0;
            return;
        }

        slot.clean_successes += 1;
        if slot.clean_successes >= self.policy.recovery_successes.max(1) {
            let narrowed = slot.interval.mul_f64(self.policy.recovery_multiplier.clamp(0.0, 1.0));
            slot.interval = narrowed.max(slot.floor);
            slot.clean_successes = 0;
            debug!(domain = %domain, "Rate limit interval relaxed to {:?}", slot.interval);
        }
    }

    /// 按 robots.txt 的 Crawl-delay 抬高间隔下限，不超过上限
    pub fn raise_floor(&self, domain: &str, delay: Duration) {
        let mut slot = self
            .slots
            .entry(domain.to_string())
            .or_insert_with(|| DomainSlot::new(&self.policy));

        let floor = delay.min(self.policy.max_interval);
        if floor > slot.floor {
            slot.floor = floor;
            slot.interval = slot.interval.max(floor);
        }
    }

    /// 当前生效的间隔
    pub fn interval(&self, domain: &str) -> Duration {
        self.slots
            .get(domain)
            .map(|slot| slot.interval)
            .unwrap_or(self.policy.base_interval)
    }
}

/// 域名准入许可
///
/// 丢弃时释放域名的在途标记
#[derive(Debug)]
pub struct AdmissionPermit {
    limiter: DomainRateLimiter,
    domain: String,
    previous: Option<Instant>,
    released: bool,
}

impl AdmissionPermit {
    /// 撤销准入（未实际发出请求），恢复原调度时间
    pub fn revoke(mut self) {
        if let Some(mut slot) = self.limiter.slots.get_mut(&self.domain) {
            slot.last_dispatch = self.previous;
            slot.in_flight = false;
        }
        self.released = true;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if !self.released {
            self.limiter.release(&self.domain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> DomainRateLimiter {
        DomainRateLimiter::new(RateLimitPolicy {
            base_interval: Duration::from_secs(2),
            ..RateLimitPolicy::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_serializes_and_spaces_same_domain() {
        let limiter = limiter();

        let permit = match limiter.try_admit("hotel.test") {
            Admission::Admitted(permit) => permit,
            other => panic!("expected admission, got {:?}", other),
        };
        assert!(matches!(limiter.try_admit("hotel.test"), Admission::InFlight));

        // other domains are unaffected
        assert!(matches!(limiter.try_admit("other.test"), Admission::Admitted(_)));

        drop(permit);
        let start = Instant::now();
        match limiter.try_admit("hotel.test") {
            Admission::NotBefore(at) => assert_eq!(at, start + Duration::from_secs(2)),
            other => panic!("expected NotBefore, got {:?}", other),
        }

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(limiter.try_admit("hotel.test"), Admission::Admitted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_restores_previous_dispatch_time() {
        let limiter = limiter();
        let Admission::Admitted(permit) = limiter.try_admit("hotel.test") else {
            panic!("expected admission");
        };
        permit.revoke();
        assert!(matches!(limiter.try_admit("hotel.test"), Admission::Admitted(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalty_widens_and_recovers() {
        let limiter = limiter();
        limiter.penalize("hotel.test");
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(4));
        limiter.penalize("hotel.test");
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(8));

        limiter.record_success("hotel.test");
        limiter.record_success("hotel.test");
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(8));
        limiter.record_success("hotel.test");
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(4));

        for _ in 0..6 {
            limiter.record_success("hotel.test");
        }
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalty_is_capped() {
        let limiter = limiter();
        for _ in 0..10 {
            limiter.penalize("hotel.test");
        }
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_delay_raises_floor() {
        let limiter = limiter();
        limiter.raise_floor("hotel.test", Duration::from_secs(5));
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(5));

        limiter.penalize("hotel.test");
        for _ in 0..9 {
            limiter.record_success("hotel.test");
        }
        assert_eq!(limiter.interval("hotel.test"), Duration::from_secs(5));
    }
}
