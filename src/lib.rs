// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 爬虫模块
///
/// 爬虫构建器、处理器注册表、数据批处理和运行汇总
pub mod crawler;

/// 领域模块
///
/// 包含抓取请求与响应
pub mod domain;

/// 引擎模块
///
/// 传输层抽象与基于reqwest的实现
pub mod engines;

/// 基础设施模块
///
/// 统计计数器与指标导出
pub mod infrastructure;

/// 代理模块
///
/// 代理列表加载与轮换
pub mod proxy;

/// 队列模块
///
/// 优先级任务队列、结果队列和远程任务队列
pub mod queue;

/// 工具模块
///
/// 错误类型、关闭标志和日志初始化
pub mod utils;

/// 工作器模块
///
/// 实现各类工作器与协调器
pub mod workers;

pub use config::crawler_config::CrawlerConfig;
pub use crawler::{
    CrawlContext, CrawlReport, Crawler, CrawlerBuilder, EngineState, HandlerRegistry, TaskSource,
};
pub use domain::models::{Method, Request, Response};
pub use utils::errors::{CrawlError, HandlerError, NetworkError, NetworkErrorKind};
