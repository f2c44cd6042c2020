// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::OrchestratorError;
use crate::workers::orchestrator::{DispatchSummary, JobOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// 工作管理器
///
/// 循环驱动编排器，直到没有待处理的工作或收到关闭信号
pub struct WorkerManager {
    orchestrator: Arc<JobOrchestrator>,
    poll_interval: Duration,
}

impl WorkerManager {
    pub fn new(orchestrator: Arc<JobOrchestrator>, poll_interval: Duration) -> Self {
        Self {
            orchestrator,
            poll_interval,
        }
    }

    /// 执行一轮调度
    pub async fn run_once(&self) -> Result<DispatchSummary, OrchestratorError> {
        self.orchestrator.dispatch_pending().await
    }

    /// 持续运行，定期拉取新提交的工作
    ///
    /// 收到 Ctrl-C 时停止；在途请求被丢弃，下次启动时作为中断尝试恢复
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        info!(
            concurrency = self.orchestrator.config().concurrency,
            "Worker started, polling every {:?}",
            self.poll_interval
        );

        loop {
            tokio::select! {
                result = self.orchestrator.dispatch_pending() => {
                    match result {
                        Ok(summary) if summary.dispatched > 0 || summary.jobs_finished > 0 => {
                            info!(?summary, "Dispatch round complete");
                        }
                        Ok(_) => {}
                        Err(e) => error!("Dispatch round failed: {}", e),
                    }
                }
                _ = shutdown_signal() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown_signal() => break,
            }
        }

        info!("Worker shut down");
        Ok(())
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
            // keep running without signal handling
            std::future::pending::<()>().await;
        }
    }
}
