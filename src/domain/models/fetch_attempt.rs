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
use crate::utils::retry_policy::AttemptClass;

/// 错误文本的最大保存长度
pub const MAX_ERROR_LEN: usize = 5000;

/// 一次抓取尝试的结果，只追加不修改
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchAttempt {
    pub id: Uuid,
    pub job_id: Uuid,
    pub work_item_id: Uuid,
    pub url: String,
    /// 使用的代理（已去除认证信息），直连时为空
    pub proxy: Option<String>,
    pub status_code: Option<i32>,
    pub success: bool,
    pub outcome: AttemptOutcome,
    pub error: Option<String>,
    pub response_time_ms: i64,
    /// 是否经过浏览器渲染
    pub rendered: bool,
    pub created_at: DateTime<Utc>,
}

/// 尝试结果分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RobotsDisallowed,
    TransientNetwork,
    PermanentHttp,
    CaptchaDetected,
    /// 进程在尝试完成前退出
    Interrupted,
}

impl AttemptOutcome {
    /// 映射到重试循环使用的三态分类
    pub fn class(&self) -> AttemptClass {
        match self {
            AttemptOutcome::Success => AttemptClass::Success,
            AttemptOutcome::TransientNetwork | AttemptOutcome::Interrupted => AttemptClass::Transient,
            AttemptOutcome::RobotsDisallowed
            | AttemptOutcome::PermanentHttp
            | AttemptOutcome::CaptchaDetected => AttemptClass::Permanent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::RobotsDisallowed => "robots_disallowed",
            AttemptOutcome::TransientNetwork => "transient_network",
            AttemptOutcome::PermanentHttp => "permanent_http",
            AttemptOutcome::CaptchaDetected => "captcha_detected",
            AttemptOutcome::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptOutcome {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptOutcome::Success),
            "robots_disallowed" => Ok(AttemptOutcome::RobotsDisallowed),
            "transient_network" => Ok(AttemptOutcome::TransientNetwork),
            "permanent_http" => Ok(AttemptOutcome::PermanentHttp),
            "captcha_detected" => Ok(AttemptOutcome::CaptchaDetected),
            "interrupted" => Ok(AttemptOutcome::Interrupted),
            other => Err(DomainError::UnknownValue(other.to_string())),
        }
    }
}

impl FetchAttempt {
    /// 创建尝试记录
    pub fn new(job_id: Uuid, work_item_id: Uuid, url: &str, outcome: AttemptOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            work_item_id,
            url: url.to_string(),
            proxy: None,
            status_code: None,
            success: outcome == AttemptOutcome::Success,
            outcome,
            error: None,
            response_time_ms: 0,
            rendered: false,
            created_at: Utc::now(),
        }
    }

    /// 设置错误文本（超长时截断）
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(truncate_error(error.into()));
        self
    }
}

/// 按字符边界截断错误文本
pub fn truncate_error(mut error: String) -> String {
    if error.len() > MAX_ERROR_LEN {
        let mut cut = MAX_ERROR_LEN;
        while !error.is_char_boundary(cut) {
            cut -= 1;
        }
        error.truncate(cut);
    }
    error
}
