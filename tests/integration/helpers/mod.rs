// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod mock_transport;

use crawlrs_engine::config::crawler_config::CrawlerConfig;
use crawlrs_engine::crawler::{CrawlContext, CrawlReport, HandlerRegistry};
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::utils::errors::{CrawlError, HandlerError};
use std::future::Future;
use std::time::Duration;

/// 测试用的快速配置
pub fn test_config() -> CrawlerConfig {
    CrawlerConfig {
        network_workers: 2,
        result_workers: 2,
        poll_interval: Duration::from_millis(5),
        backpressure_sleep: Duration::from_millis(1),
        pause_ack_timeout: Duration::from_millis(50),
        stat_logging: false,
        ..Default::default()
    }
}

/// 只注册一个什么也不产出的默认处理器
pub fn noop_registry() -> HandlerRegistry {
    HandlerRegistry::new().on(
        "default",
        |_: &CrawlContext, _: &Request, _: &Response| -> Result<Vec<Request>, HandlerError> {
            Ok(vec![])
        },
    )
}

/// 爬取必须在限定时间内结束
pub async fn run_bounded<F>(run: F) -> Result<CrawlReport, CrawlError>
where
    F: Future<Output = Result<CrawlReport, CrawlError>>,
{
    tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("crawler did not reach quiescence in time")
}
