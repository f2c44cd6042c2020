// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 启动 Prometheus 指标导出器并登记指标说明
///
/// # 参数
///
/// * `listen` - 监听地址，例如 `0.0.0.0:9000`
pub fn init_metrics(listen: &str) {
    let addr: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address '{}': {}, metrics disabled", listen, e);
            return;
        }
    };

    // 端口被占用时继续运行，只是没有指标
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
}

fn describe_metrics() {
    describe_counter!(
        "fetch_attempts_total",
        Unit::Count,
        "Fetch attempts by outcome"
    );
    describe_histogram!(
        "fetch_latency_seconds",
        Unit::Seconds,
        "Wall time of a single fetch attempt"
    );
    describe_counter!(
        "links_discovered_total",
        Unit::Count,
        "Social links extracted, by network"
    );
    describe_counter!(
        "jobs_terminal_total",
        Unit::Count,
        "Jobs reaching a terminal status"
    );
    describe_gauge!("jobs_in_progress", Unit::Count, "Jobs currently running");
    describe_counter!(
        "domain_rate_limit_penalties_total",
        Unit::Count,
        "429 responses that widened a domain interval"
    );
    describe_counter!(
        "proxy_quarantined_total",
        Unit::Count,
        "Proxies moved into quarantine"
    );
    describe_gauge!(
        "proxies_quarantined",
        Unit::Count,
        "Proxies currently quarantined"
    );
    describe_counter!(
        "worker_errors_total",
        Unit::Count,
        "Persistence and task failures inside the worker"
    );
}
