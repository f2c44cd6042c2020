// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供域名级准入控制与按就绪时间排序的工作队列
pub mod domain_rate_limiter;
pub mod work_queue;
