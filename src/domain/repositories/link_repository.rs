// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::discovered_link::DiscoveredLink;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 发现链接仓库特质
#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// 插入或刷新链接
    ///
    /// `(job_id, url)` 已存在时更新 `last_seen` 并重新激活
    async fn upsert_links(&self, links: &[DiscoveredLink]) -> Result<(), RepositoryError>;

    /// 把同一来源页面上此次未再出现的链接标记为失效
    ///
    /// # 返回值
    ///
    /// 被标记失效的行数
    async fn deactivate_missing(
        &self,
        job_id: Uuid,
        source_url: &str,
        present: &[String],
    ) -> Result<u64, RepositoryError>;

    /// 列出某任务的链接
    async fn list_by_job(&self, job_id: Uuid) -> Result<Vec<DiscoveredLink>, RepositoryError>;
}
