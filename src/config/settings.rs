// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::crawler::dataops::DataOpThreshold;
use crate::infrastructure::stat::StatLoggingFormat;
use crate::proxy::{ProxyRotation, ProxyScheme};
use crate::utils::errors::NetworkErrorKind;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;

/// 应用程序配置设置
///
/// 包含爬虫、数据批处理、代理、远程任务队列、指标和种子配置
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 爬虫配置
    pub crawler: CrawlerSettings,
    /// 数据批处理配置
    #[serde(default)]
    pub dataops: DataOpSettings,
    /// 代理配置
    #[serde(default)]
    pub proxy: ProxySettings,
    /// 远程任务队列配置
    #[serde(default)]
    pub master_taskq: MasterTaskQueueSettings,
    /// 指标配置
    #[serde(default)]
    pub metrics: MetricsSettings,
    /// 种子配置
    #[serde(default)]
    pub seeds: SeedSettings,
}

/// 爬虫配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerSettings {
    /// 网络工作器数量
    pub network_workers: usize,
    /// 结果处理器数量
    pub result_workers: usize,
    /// 任务生成器数量
    pub task_generators: usize,
    /// 默认重试上限
    pub retry_limit: u32,
    /// 任务队列上限，未设置时为 max(100, 2 * network_workers)
    pub taskq_limit: Option<usize>,
    /// 结果队列上限，未设置时为 max(100, 2 * network_workers)
    pub resultq_limit: Option<usize>,
    /// 队列轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 背压等待时间（毫秒）
    pub backpressure_sleep_ms: u64,
    /// 暂停确认超时（毫秒）
    pub pause_ack_timeout_ms: u64,
    /// 处理器出错时是否停止整个爬虫
    pub stop_on_handler_error: bool,
    /// 可重试的网络错误种类，未设置时全部可重试
    pub retryable_errors: Option<Vec<NetworkErrorKind>>,
    /// 是否输出统计日志
    pub stat_logging: bool,
    /// 统计日志间隔（秒）
    pub stat_logging_interval_secs: u64,
    /// 统计日志格式
    pub stat_logging_format: StatLoggingFormat,
    /// 是否周期性输出进行中的请求
    pub debug_inflight: bool,
}

/// 数据批处理配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataOpSettings {
    /// 默认数量阈值
    pub default_count: Option<usize>,
    /// 默认字节阈值
    pub default_size: Option<usize>,
    /// 按名称覆盖的阈值
    #[serde(default)]
    pub sinks: HashMap<String, DataOpThreshold>,
}

/// 代理配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    /// 来源类型 (file, url)，未设置时不使用代理
    pub source_type: Option<String>,
    /// 文件路径或URL
    pub location: Option<String>,
    /// 代理协议
    pub scheme: ProxyScheme,
    /// 选择方式
    pub rotation: ProxyRotation,
}

/// 远程任务队列配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MasterTaskQueueSettings {
    /// Redis连接URL，未设置时不使用远程队列
    pub redis_url: Option<String>,
    /// 任务列表的键
    pub queue_key: Option<String>,
}

/// 指标配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsSettings {
    /// Prometheus导出器监听地址
    pub listen_addr: Option<String>,
}

/// 种子配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedSettings {
    /// 种子URL文件，每行一个
    pub path: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载默认值、`config/default`、`config/{APP_ENVIRONMENT}` 和 `CRAWLRS__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CRAWLRS").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// 只使用默认值的配置
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            // Default crawler settings
            .set_default("crawler.network_workers", 3)?
            .set_default("crawler.result_workers", 4)?
            .set_default("crawler.task_generators", 1)?
            .set_default("crawler.retry_limit", 3)?
            .set_default("crawler.poll_interval_ms", 50)?
            .set_default("crawler.backpressure_sleep_ms", 10)?
            .set_default("crawler.pause_ack_timeout_ms", 100)?
            .set_default("crawler.stop_on_handler_error", false)?
            .set_default("crawler.stat_logging", true)?
            .set_default("crawler.stat_logging_interval_secs", 5)?
            .set_default("crawler.stat_logging_format", "text")?
            .set_default("crawler.debug_inflight", false)?
            // Default data op settings
            .set_default("dataops.default_count", 500)?
            // Default proxy settings
            .set_default("proxy.scheme", "http")?
            .set_default("proxy.rotation", "random")?
            // Default master task queue settings
            .set_default("master_taskq.queue_key", "crawlrs:tasks")
    }
}
