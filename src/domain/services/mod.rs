// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 可替换的页面能力：社交链接提取与页面启发式判断
pub mod link_extractor;
pub mod page_heuristics;
