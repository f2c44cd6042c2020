// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 检查点存储实现
///
/// - `DbCheckpointStore`：写入数据库 `checkpoints` 表
/// - `FileCheckpointStore`：原子替换的本地 JSON 文件
pub mod db_store;
pub mod file_store;

pub use db_store::DbCheckpointStore;
pub use file_store::FileCheckpointStore;
