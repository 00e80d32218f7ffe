// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// 爬虫生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Created,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            EngineState::Created => "created",
            EngineState::Running => "running",
            EngineState::Draining => "draining",
            EngineState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// 重试耗尽被拒绝的请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRequest {
    pub url: String,
    pub name: String,
    pub retry_count: u32,
    /// 网络错误标签，或 `http:status-<code>`
    pub reason: String,
}

impl RejectedRequest {
    pub(crate) fn new(request: &Request, response: &Response) -> Self {
        let reason = match (&response.error, response.status) {
            (Some(error), _) => error.tag().to_string(),
            (None, Some(status)) => format!("http:status-{}", status),
            (None, None) => "unknown".to_string(),
        };
        Self {
            url: request.url().to_string(),
            name: request.name().to_string(),
            retry_count: request.retry_count(),
            reason,
        }
    }
}

/// 一次正常结束的爬取汇总
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub state: EngineState,
    pub counters: BTreeMap<String, u64>,
    pub rejected: Vec<RejectedRequest>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl CrawlReport {
    pub fn counter(&self, key: &str) -> u64 {
        self.counters.get(key).copied().unwrap_or(0)
    }
}

mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
