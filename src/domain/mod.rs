// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 该模块包含系统的核心业务逻辑，包括：
/// - 领域模型（models）：任务、工作项、尝试、链接、代理、检查点
/// - 仓库接口（repositories）：数据持久化抽象接口
/// - 服务（services）：链接提取与页面启发式等可替换能力
pub mod models;
pub mod repositories;
pub mod services;
