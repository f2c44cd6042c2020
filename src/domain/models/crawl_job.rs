// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 抓取任务实体
///
/// 一个任务包含一个或多个工作项（酒店 + 种子URL）。
/// 状态只向前推进，唯一的例外是显式的强制重试；
/// `attempts` 只在派发时递增，从不递减。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 任务状态
    pub status: JobStatus,
    /// 已派发的尝试总数
    pub attempts: i32,
    /// 最近一次失败尝试的错误信息
    pub last_error: Option<String>,
    /// 提交时附带的任意元数据（含批次名和批次ID）
    pub metadata: serde_json::Value,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 更新时间
    pub updated_at: DateTime<Utc>,
    /// 进入终态的时间
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务状态枚举
///
/// Queued → Running → Completed / Partial / Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已入队
    #[default]
    Queued,
    /// 已有工作项被派发
    Running,
    /// 全部工作项成功
    Completed,
    /// 全部工作项失败，或被显式中止
    Failed,
    /// 部分成功部分失败
    Partial,
}

impl JobStatus {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Partial
        )
    }

    /// 根据工作项结果汇总任务状态
    ///
    /// 仍有未结束的工作项时返回 `None`。
    /// 失败优先于部分成功，部分成功优先于完成。
    pub fn aggregate(succeeded: usize, failed: usize, pending: usize) -> Option<JobStatus> {
        if pending > 0 {
            return None;
        }
        match (succeeded, failed) {
            (_, 0) => Some(JobStatus::Completed),
            (0, _) => Some(JobStatus::Failed),
            _ => Some(JobStatus::Partial),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Partial => "partial",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "partial" => Ok(JobStatus::Partial),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 无效的状态转换
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 无法识别的枚举值
    #[error("Unknown value: {0}")]
    UnknownValue(String),
}

impl CrawlJob {
    /// 创建一个新的任务
    ///
    /// # 参数
    ///
    /// * `id` - 任务ID，传入已有ID可以使重复提交幂等
    /// * `metadata` - 任务元数据
    pub fn new(id: Uuid, metadata: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Queued,
            attempts: 0,
            last_error: None,
            metadata,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// 首个工作项派发时进入运行状态
    ///
    /// 已在运行中时保持不变
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Queued => {
                self.status = JobStatus::Running;
                self.updated_at = Utc::now();
                Ok(self)
            }
            JobStatus::Running => Ok(self),
            other => Err(DomainError::InvalidStateTransition(format!(
                "cannot start job in {} state",
                other
            ))),
        }
    }

    /// 所有工作项结束后进入终态
    pub fn finish(mut self, status: JobStatus, last_error: Option<String>) -> Result<Self, DomainError> {
        if self.status.is_terminal() || !status.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "cannot finish job from {} to {}",
                self.status, status
            )));
        }
        let now = Utc::now();
        self.status = status;
        if last_error.is_some() {
            self.last_error = last_error;
        }
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(self)
    }

    /// 显式中止任务
    pub fn abort(mut self, reason: &str) -> Result<Self, DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStateTransition(format!(
                "job already {}",
                self.status
            )));
        }
        let now = Utc::now();
        self.status = JobStatus::Failed;
        self.last_error = Some(format!("aborted: {}", reason));
        self.updated_at = now;
        self.completed_at = Some(now);
        Ok(self)
    }

    /// 强制重试：回到排队状态，保留累计的尝试次数
    pub fn reset_for_retry(mut self) -> Self {
        self.status = JobStatus::Queued;
        self.last_error = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
        self
    }
}
