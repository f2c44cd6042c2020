// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::hotel::Hotel;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 酒店仓库特质
#[async_trait]
pub trait HotelRepository: Send + Sync {
    /// 按域名插入或更新酒店
    ///
    /// 已存在时仅在提供了新名称时更新名称与更新时间
    ///
    /// # 返回值
    ///
    /// * `Ok(Hotel)` - 数据库中的酒店记录
    /// * `Err(RepositoryError)` - 操作失败
    async fn upsert_by_domain(&self, domain: &str, name: Option<&str>) -> Result<Hotel, RepositoryError>;

    /// 根据ID查找酒店
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Hotel>, RepositoryError>;
}
