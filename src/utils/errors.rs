// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::crawl_job::DomainError;

/// 抓取错误分类
///
/// 每个工作项的失败都会归入其中一类，决定是否重试以及如何记录
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrawlError {
    /// robots.txt 禁止抓取，终态且不重试
    #[error("robots.txt disallows {0}")]
    RobotsDisallowed(String),

    /// 超时、连接重置、5xx、429 等可重试错误
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// 除 429 之外的 4xx、TLS 错误等终态错误
    #[error("permanent HTTP failure ({status}): {message}")]
    PermanentHttp { status: u16, message: String },

    /// 当前没有可用代理
    #[error("no proxy available")]
    ProxyUnavailable,

    /// 渲染失败，回退为未渲染结果
    #[error("render failure: {0}")]
    RenderFailure(String),

    /// 检查点写入失败，暂停调度直到恢复
    #[error("checkpoint write failure: {0}")]
    CheckpointWriteFailure(String),

    /// 检测到验证码页面，需人工处理
    #[error("captcha detected at {0}")]
    CaptchaDetected(String),
}

impl CrawlError {
    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CrawlError::TransientNetwork(_) | CrawlError::ProxyUnavailable
        )
    }
}

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 存储中的值无法还原为领域对象
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// 检查点存储错误
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("检查点文件读写失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("检查点序列化失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("检查点仓库错误: {0}")]
    Repository(#[from] RepositoryError),
}

/// 编排器错误类型
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("仓库错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("检查点错误: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("领域错误: {0}")]
    Domain(#[from] DomainError),

    #[error("任务不存在: {0}")]
    JobNotFound(Uuid),

    #[error("无效输入: {0}")]
    InvalidInput(String),
}
