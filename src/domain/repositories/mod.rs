// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 酒店仓库（hotel_repository）
/// - 任务与工作项仓库（job_repository）
/// - 抓取尝试仓库（fetch_attempt_repository）
/// - 发现链接仓库（link_repository）
/// - 代理池仓库（proxy_repository）
/// - 检查点存储（checkpoint_store）
pub mod checkpoint_store;
pub mod fetch_attempt_repository;
pub mod hotel_repository;
pub mod job_repository;
pub mod link_repository;
pub mod proxy_repository;
