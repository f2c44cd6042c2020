// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::proxy::Proxy;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;

/// 代理池仓库特质
#[async_trait]
pub trait ProxyRepository: Send + Sync {
    /// 导入代理地址，已存在的地址保持原有健康状态
    ///
    /// # 返回值
    ///
    /// 新增的代理数量
    async fn insert_endpoints(&self, endpoints: &[String]) -> Result<u64, RepositoryError>;

    /// 列出全部代理
    async fn list_all(&self) -> Result<Vec<Proxy>, RepositoryError>;

    /// 写回健康状态快照
    async fn save_states(&self, proxies: &[Proxy]) -> Result<(), RepositoryError>;
}
