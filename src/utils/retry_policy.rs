// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 单次抓取结果的分类
///
/// 重试循环只依据该分类和已尝试次数做决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    Success,
    Transient,
    Permanent,
}

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 工作项成功结束
    Done,
    /// 在给定退避后重新入队
    RetryAfter(Duration),
    /// 不再重试（终态失败或次数耗尽）
    GiveUp { exhausted: bool },
}

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 每个工作项的最大尝试次数（包含首次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            enable_jitter: true,
        }
    }
}

impl RetryPolicy {
    /// 计算第 `attempt` 次失败后的退避时间
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) as i32 - 1;
        let backoff_secs = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        // 添加抖动
        let final_backoff = if self.enable_jitter && self.jitter_factor > 0.0 && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            let jitter = rand::random_range(-jitter_range..jitter_range);
            (capped_backoff + jitter).max(0.0)
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 是否还有剩余尝试次数
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// 根据结果分类与已尝试次数给出决策
    ///
    /// # 参数
    ///
    /// * `class` - 本次尝试的结果分类
    /// * `attempts_made` - 含本次在内已经进行的尝试次数
    pub fn decide(&self, class: AttemptClass, attempts_made: u32) -> RetryDecision {
        match class {
            AttemptClass::Success => RetryDecision::Done,
            AttemptClass::Permanent => RetryDecision::GiveUp { exhausted: false },
            AttemptClass::Transient if self.should_retry(attempts_made) => {
                RetryDecision::RetryAfter(self.calculate_backoff(attempts_made))
            }
            AttemptClass::Transient => RetryDecision::GiveUp { exhausted: true },
        }
    }
}
