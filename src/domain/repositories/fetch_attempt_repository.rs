// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::fetch_attempt::FetchAttempt;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 抓取尝试仓库特质（只追加）
#[async_trait]
pub trait FetchAttemptRepository: Send + Sync {
    /// 追加一条尝试记录
    async fn append(&self, attempt: &FetchAttempt) -> Result<(), RepositoryError>;

    /// 按时间顺序列出某任务的尝试
    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<FetchAttempt>, RepositoryError>;

    /// 统计某工作项的尝试次数
    async fn count_by_item(&self, work_item_id: Uuid) -> Result<u64, RepositoryError>;
}
