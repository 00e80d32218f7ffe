// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use dashmap::DashMap;
use metrics::counter;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::utils::shutdown::ShutdownFlag;

pub const REQUEST_PROCESSED: &str = "crawler:request-processed";
pub const REQUEST_OK: &str = "crawler:request-ok";
pub const REQUEST_FAIL: &str = "crawler:request-fail";
pub const REQUEST_RETRY: &str = "crawler:request-retry";
pub const REQUEST_REJECTED: &str = "crawler:request-rejected";

/// 统计日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatLoggingFormat {
    #[default]
    Text,
    Json,
}

/// 爬虫统计计数器
///
/// 只读地暴露给日志和监控；每次递增同时写入 `metrics` 门面
#[derive(Default)]
pub struct Stat {
    counters: DashMap<String, AtomicU64>,
}

impl Stat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, key: &str) {
        self.add(key, 1);
    }

    pub fn add(&self, key: &str, value: u64) {
        if let Some(counter) = self.counters.get(key) {
            counter.fetch_add(value, Ordering::Relaxed);
        } else {
            self.counters
                .entry(key.to_string())
                .or_default()
                .fetch_add(value, Ordering::Relaxed);
        }
        counter!("crawler_events_total", "event" => key.to_string()).increment(value);
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counters
            .get(key)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// 所有计数器的快照，按键排序
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

/// 周期性输出统计日志
///
/// 输出 `crawler:request-processed` 的处理速度以及所有计数器
pub async fn run_stat_logger(
    stat: Arc<Stat>,
    shutdown: ShutdownFlag,
    interval: Duration,
    format: StatLoggingFormat,
) {
    let mut last_processed = stat.get(REQUEST_PROCESSED);
    let mut last_tick = Instant::now();

    while !shutdown.is_set() {
        shutdown.wait(interval).await;

        let processed = stat.get(REQUEST_PROCESSED);
        let elapsed = last_tick.elapsed().as_secs_f64().max(f64::EPSILON);
        let speed = (processed - last_processed) as f64 / elapsed;
        last_processed = processed;
        last_tick = Instant::now();

        let snapshot = stat.snapshot();
        match format {
            StatLoggingFormat::Text => {
                let counters: Vec<String> = snapshot
                    .iter()
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect();
                info!("RPS: {:.2} | {}", speed, counters.join(" | "));
            }
            StatLoggingFormat::Json => {
                let counters = serde_json::to_string(&snapshot).unwrap_or_default();
                info!(rps = speed, counters = %counters, "crawler stat");
            }
        }
    }
}
