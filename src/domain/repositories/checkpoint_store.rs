// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::checkpoint::CheckpointEntry;
use crate::utils::errors::CheckpointError;
use async_trait::async_trait;
use uuid::Uuid;

/// 检查点存储特质
///
/// `record` 返回即表示已持久化。对同一 (任务, URL) 重复记录相同结果是幂等的。
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 从持久化介质加载
    async fn load(&self) -> Result<(), CheckpointError>;

    /// (任务, URL) 是否已完成
    async fn is_done(&self, job_id: Uuid, url: &str) -> Result<bool, CheckpointError>;

    /// 读取条目
    async fn get(&self, job_id: Uuid, url: &str) -> Result<Option<CheckpointEntry>, CheckpointError>;

    /// 记录完成结果并持久化
    async fn record(&self, entry: CheckpointEntry) -> Result<(), CheckpointError>;

    /// 清除单个条目
    async fn clear(&self, job_id: Uuid, url: &str) -> Result<(), CheckpointError>;

    /// 清除某任务的全部条目
    async fn clear_job(&self, job_id: Uuid) -> Result<u64, CheckpointError>;

    /// 将内存状态写入持久化介质
    async fn flush(&self) -> Result<(), CheckpointError>;
}
