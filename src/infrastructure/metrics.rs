// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 初始化指标系统
///
/// 在 `addr` 上启动Prometheus导出器并注册爬虫指标。
/// 地址已被占用时只记录警告，爬虫照常运行。
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new();

    if let Err(e) = builder.with_http_listener(addr).install() {
        warn!(
            "Failed to install Prometheus recorder: {}. This might happen if the port is already in use.",
            e
        );
        return;
    }

    describe_counter!(
        "crawler_events_total",
        "Crawler events by name (processed, ok, fail, retry, rejected, network errors, HTTP statuses)"
    );

    info!("Metrics exporter listening on {}", addr);
}
