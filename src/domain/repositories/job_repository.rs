// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::crawl_job::CrawlJob;
use crate::domain::models::work_item::WorkItem;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// 任务与工作项仓库特质
///
/// 任务状态只由编排器修改
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建任务；同ID任务已存在时返回已有记录
    async fn create_job_if_absent(&self, job: &CrawlJob) -> Result<CrawlJob, RepositoryError>;

    /// 根据ID查找任务
    async fn find_job(&self, id: Uuid) -> Result<Option<CrawlJob>, RepositoryError>;

    /// 更新任务状态、错误与时间戳
    async fn update_job(&self, job: &CrawlJob) -> Result<(), RepositoryError>;

    /// 原子地将任务尝试次数加一
    async fn increment_job_attempts(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 列出未进入终态的任务
    async fn list_active_jobs(&self) -> Result<Vec<CrawlJob>, RepositoryError>;

    /// 批量插入工作项，`(job_id, url)` 冲突时忽略
    ///
    /// # 返回值
    ///
    /// 实际插入的行数
    async fn insert_items(&self, items: &[WorkItem]) -> Result<u64, RepositoryError>;

    /// 列出某任务的全部工作项
    async fn find_items_by_job(&self, job_id: Uuid) -> Result<Vec<WorkItem>, RepositoryError>;

    /// 更新工作项
    async fn update_item(&self, item: &WorkItem) -> Result<(), RepositoryError>;

    /// 条件更新工作项
    ///
    /// 仅当存储中的状态与尝试次数仍等于 `expected` 时写入；多个 worker 以此认领工作项
    ///
    /// # 参数
    ///
    /// * `item` - 新的工作项状态
    /// * `expected` - 读取时的工作项
    /// * `stale_before` - 给出时还要求上次更新早于该时刻
    ///
    /// # 返回值
    ///
    /// 是否写入；`false` 表示工作项已被其他进程改动
    async fn update_item_if(
        &self,
        item: &WorkItem,
        expected: &WorkItem,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<bool, RepositoryError>;
}
