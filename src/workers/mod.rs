// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 任务编排、有界并发调度与后台运行循环
pub mod manager;
pub mod orchestrator;

pub use manager::WorkerManager;
pub use orchestrator::{CrawlStores, DispatchSummary, JobOrchestrator, OrchestratorConfig};
