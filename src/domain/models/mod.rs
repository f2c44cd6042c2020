// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// 该模块定义了系统的核心业务实体，包括：
/// - 酒店（hotel）：以域名标识的抓取目标
/// - 抓取任务（crawl_job）：一批工作项及其状态机
/// - 工作项（work_item）：单个（酒店, 种子URL）对
/// - 抓取尝试（fetch_attempt）：只追加的尝试历史
/// - 发现的链接（discovered_link）：规范化的社交媒体链接
/// - 代理（proxy）：代理池条目与健康状态
/// - 检查点（checkpoint）：用于断点续跑的完成标记
pub mod checkpoint;
pub mod crawl_job;
pub mod discovered_link;
pub mod fetch_attempt;
pub mod hotel;
pub mod proxy;
pub mod work_item;
