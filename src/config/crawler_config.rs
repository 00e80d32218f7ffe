// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::config::settings::Settings;
use crate::crawler::dataops::DataOpThreshold;
use crate::infrastructure::stat::StatLoggingFormat;
use crate::utils::errors::{CrawlError, NetworkErrorKind};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// 爬虫运行配置
///
/// 显式传给爬虫构建器，没有任何进程级的全局配置
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub network_workers: usize,
    pub result_workers: usize,
    pub task_generators: usize,
    pub retry_limit: u32,
    pub taskq_limit: usize,
    pub resultq_limit: usize,
    pub poll_interval: Duration,
    pub backpressure_sleep: Duration,
    pub pause_ack_timeout: Duration,
    pub stop_on_handler_error: bool,
    pub retryable_errors: HashSet<NetworkErrorKind>,
    pub stat_logging: bool,
    pub stat_logging_interval: Duration,
    pub stat_logging_format: StatLoggingFormat,
    pub debug_inflight: bool,
    pub dataop_default_threshold: DataOpThreshold,
    pub dataop_thresholds: HashMap<String, DataOpThreshold>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        let network_workers = 3;
        Self {
            network_workers,
            result_workers: 4,
            task_generators: 1,
            retry_limit: 3,
            taskq_limit: default_queue_limit(network_workers),
            resultq_limit: default_queue_limit(network_workers),
            poll_interval: Duration::from_millis(50),
            backpressure_sleep: Duration::from_millis(10),
            pause_ack_timeout: Duration::from_millis(100),
            stop_on_handler_error: false,
            retryable_errors: NetworkErrorKind::ALL.into_iter().collect(),
            stat_logging: true,
            stat_logging_interval: Duration::from_secs(5),
            stat_logging_format: StatLoggingFormat::Text,
            debug_inflight: false,
            dataop_default_threshold: DataOpThreshold::default(),
            dataop_thresholds: HashMap::new(),
        }
    }
}

/// 队列上限默认值
pub fn default_queue_limit(network_workers: usize) -> usize {
    100.max(network_workers * 2)
}

impl CrawlerConfig {
    /// 从应用配置构建
    pub fn from_settings(settings: &Settings) -> Self {
        let crawler = &settings.crawler;
        Self {
            network_workers: crawler.network_workers,
            result_workers: crawler.result_workers,
            task_generators: crawler.task_generators,
            retry_limit: crawler.retry_limit,
            taskq_limit: crawler
                .taskq_limit
                .unwrap_or_else(|| default_queue_limit(crawler.network_workers)),
            resultq_limit: crawler
                .resultq_limit
                .unwrap_or_else(|| default_queue_limit(crawler.network_workers)),
            poll_interval: Duration::from_millis(crawler.poll_interval_ms),
            backpressure_sleep: Duration::from_millis(crawler.backpressure_sleep_ms),
            pause_ack_timeout: Duration::from_millis(crawler.pause_ack_timeout_ms),
            stop_on_handler_error: crawler.stop_on_handler_error,
            retryable_errors: match &crawler.retryable_errors {
                Some(kinds) => kinds.iter().copied().collect(),
                None => NetworkErrorKind::ALL.into_iter().collect(),
            },
            stat_logging: crawler.stat_logging,
            stat_logging_interval: Duration::from_secs(crawler.stat_logging_interval_secs),
            stat_logging_format: crawler.stat_logging_format,
            debug_inflight: crawler.debug_inflight,
            dataop_default_threshold: DataOpThreshold {
                count: settings.dataops.default_count,
                size: settings.dataops.default_size,
            },
            dataop_thresholds: settings.dataops.sinks.clone(),
        }
    }

    /// 检查配置是否可用
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.network_workers == 0 {
            return Err(CrawlError::Config("network_workers must be > 0".to_string()));
        }
        if self.result_workers == 0 {
            return Err(CrawlError::Config("result_workers must be > 0".to_string()));
        }
        if self.taskq_limit == 0 || self.resultq_limit == 0 {
            return Err(CrawlError::Config("queue limits must be > 0".to_string()));
        }
        if self.poll_interval.is_zero() || self.pause_ack_timeout.is_zero() {
            return Err(CrawlError::Config(
                "poll_interval and pause_ack_timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
