// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::crawl_job::DomainError;

/// 检查点条目：(任务, URL) → 完成标记
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub job_id: Uuid,
    pub url: String,
    pub outcome: CheckpointOutcome,
    /// 结果摘要，如发现的链接数或最后的错误
    pub summary: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// 工作项的终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointOutcome {
    Succeeded,
    Failed,
}

impl CheckpointOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointOutcome::Succeeded => "succeeded",
            CheckpointOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for CheckpointOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckpointOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "succeeded" => Ok(CheckpointOutcome::Succeeded),
            "failed" => Ok(CheckpointOutcome::Failed),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

impl CheckpointEntry {
    pub fn new(job_id: Uuid, url: impl Into<String>, outcome: CheckpointOutcome, summary: Option<String>) -> Self {
        Self {
            job_id,
            url: url.into(),
            outcome,
            summary,
            recorded_at: Utc::now(),
        }
    }

    /// 存储键
    pub fn key(&self) -> String {
        checkpoint_key(self.job_id, &self.url)
    }

    /// 两个条目是否表达同一个完成结果（忽略记录时间）
    pub fn same_result(&self, other: &CheckpointEntry) -> bool {
        self.job_id == other.job_id
            && self.url == other.url
            && self.outcome == other.outcome
            && self.summary == other.summary
    }
}

/// 生成 (任务, URL) 的存储键
pub fn checkpoint_key(job_id: Uuid, url: &str) -> String {
    format!("{}|{}", job_id, url)
}
