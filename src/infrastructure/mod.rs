// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 领域层接口的具体实现：
/// - 检查点（checkpoint）：数据库与文件两种检查点存储
/// - 数据库（database）：连接池与 SeaORM 实体
/// - 指标（metrics）：Prometheus 导出器
/// - 仓库实现（repositories）：任务、工作项、尝试、链接、代理的持久化
pub mod checkpoint;
pub mod database;
pub mod metrics;
pub mod repositories;
