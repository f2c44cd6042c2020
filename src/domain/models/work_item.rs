// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

use super::crawl_job::DomainError;
use crate::utils::url_utils;

/// 工作项：一个（酒店, 种子URL）对
///
/// 对同一任务而言 `(job_id, url)` 唯一
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub hotel_id: Uuid,
    pub url: String,
    /// 用于限流的目标域名
    pub domain: String,
    pub status: ItemStatus,
    /// 本轮已派发次数
    pub attempts: i32,
    pub last_error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    /// 重试排期：在此之前不得派发
    pub next_eligible_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 工作项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Succeeded | ItemStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Running => "running",
            ItemStatus::Succeeded => "succeeded",
            ItemStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ItemStatus::Queued),
            "running" => Ok(ItemStatus::Running),
            "succeeded" => Ok(ItemStatus::Succeeded),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

/// 工作项终态失败的原因
///
/// `CaptchaDetected` 的工作项组成人工复核队列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RobotsDisallowed,
    CaptchaDetected,
    PermanentHttp,
    RetriesExhausted,
    Aborted,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RobotsDisallowed => "robots_disallowed",
            FailureKind::CaptchaDetected => "captcha_detected",
            FailureKind::PermanentHttp => "permanent_http",
            FailureKind::RetriesExhausted => "retries_exhausted",
            FailureKind::Aborted => "aborted",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "robots_disallowed" => Ok(FailureKind::RobotsDisallowed),
            "captcha_detected" => Ok(FailureKind::CaptchaDetected),
            "permanent_http" => Ok(FailureKind::PermanentHttp),
            "retries_exhausted" => Ok(FailureKind::RetriesExhausted),
            "aborted" => Ok(FailureKind::Aborted),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

impl WorkItem {
    /// 创建新的工作项
    ///
    /// # 参数
    ///
    /// * `job_id` - 所属任务
    /// * `hotel_id` - 所属酒店
    /// * `url` - 种子URL（需为绝对 http/https 地址）
    pub fn new(job_id: Uuid, hotel_id: Uuid, url: &Url) -> Result<Self, DomainError> {
        let domain = url_utils::domain_of(url)
            .ok_or_else(|| DomainError::ValidationError(format!("URL has no host: {}", url)))?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            job_id,
            hotel_id,
            url: url.to_string(),
            domain,
            status: ItemStatus::Queued,
            attempts: 0,
            last_error: None,
            failure_kind: None,
            next_eligible_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 派发：Queued → Running，尝试次数加一
    pub fn start(mut self) -> Result<Self, DomainError> {
        if self.status != ItemStatus::Queued {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot dispatch item in {} state",
                self.status
            )));
        }
        self.status = ItemStatus::Running;
        self.attempts += 1;
        self.next_eligible_at = None;
        self.updated_at = Utc::now();
        Ok(self)
    }

    pub fn succeed(mut self) -> Self {
        self.status = ItemStatus::Succeeded;
        self.failure_kind = None;
        self.next_eligible_at = None;
        self.updated_at = Utc::now();
        self
    }

    pub fn fail(mut self, kind: FailureKind, error: Option<String>) -> Self {
        self.status = ItemStatus::Failed;
        self.failure_kind = Some(kind);
        if error.is_some() {
            self.last_error = error;
        }
        self.next_eligible_at = None;
        self.updated_at = Utc::now();
        self
    }

    /// 可重试失败：回到队列并记录最早可派发时间
    pub fn requeue(mut self, eligible_at: DateTime<Utc>, error: Option<String>) -> Self {
        self.status = ItemStatus::Queued;
        self.next_eligible_at = Some(eligible_at);
        if error.is_some() {
            self.last_error = error;
        }
        self.updated_at = Utc::now();
        self
    }

    /// 强制重试时重置为初始状态
    pub fn reset(mut self) -> Self {
        self.status = ItemStatus::Queued;
        self.attempts = 0;
        self.last_error = None;
        self.failure_kind = None;
        self.next_eligible_at = None;
        self.updated_at = Utc::now();
        self
    }
}
