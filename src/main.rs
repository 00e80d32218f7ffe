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

use anyhow::Context;
use crawlrs_engine::config::crawler_config::CrawlerConfig;
use crawlrs_engine::config::settings::Settings;
use crawlrs_engine::crawler::{
    CrawlContext, Crawler, DataOp, HandlerRegistry, ResultHandler, TaskSource,
};
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::infrastructure::stat::StatLoggingFormat;
use crawlrs_engine::proxy::{ProxyList, ProxySource};
use crawlrs_engine::queue::remote::RedisTaskQueue;
use crawlrs_engine::utils::errors::{CrawlError, HandlerError};
use crawlrs_engine::utils::telemetry;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// 记录每个种子URL抓取结果的数据批次
const STATUS_SINK: &str = "statuses";

/// 把每个成功结果的状态码加入数据批次
struct StatusRecorder;

#[async_trait::async_trait]
impl ResultHandler for StatusRecorder {
    async fn handle(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        response: &Response,
    ) -> Result<Vec<Request>, HandlerError> {
        let row = json!({
            "url": request.url(),
            "status": response.status,
            "bytes": response.body.as_ref().map(|b| b.len()).unwrap_or(0),
        });
        ctx.enqueue_op(STATUS_SINK, Some(row), None).await?;
        Ok(vec![])
    }
}

fn log_statuses(name: &str, ops: Vec<DataOp>) -> Result<(), HandlerError> {
    info!("Flushing {} rows from {}", ops.len(), name);
    for op in ops {
        info!("{}", op);
    }
    Ok(())
}

async fn read_seeds(path: &str) -> anyhow::Result<Vec<Request>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seeds from {}", path))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|url| Request::get(url).build())
        .collect())
}

async fn load_proxies(settings: &Settings) -> anyhow::Result<Option<Arc<ProxyList>>> {
    let proxy = &settings.proxy;
    let Some(source_type) = proxy.source_type.as_deref() else {
        return Ok(None);
    };
    let location = proxy
        .location
        .clone()
        .ok_or_else(|| CrawlError::Config("proxy.location is required".to_string()))?;
    let source = match source_type {
        "file" => ProxySource::File(location.into()),
        "url" => ProxySource::Url(location),
        other => {
            return Err(CrawlError::Config(format!("unknown proxy source type: {}", other)).into())
        }
    };
    let list = ProxyList::load(source, proxy.scheme, proxy.rotation).await?;
    info!("Loaded {} proxies", list.size());
    Ok(Some(Arc::new(list)))
}

/// 主函数
///
/// 加载配置，抓取种子URL并输出运行汇总；致命错误时以非零状态退出
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging
    match settings.crawler.stat_logging_format {
        StatLoggingFormat::Json => telemetry::init_telemetry_json(),
        StatLoggingFormat::Text => telemetry::init_telemetry(),
    }
    info!("Starting crawlrs-engine...");

    // 3. Initialize Prometheus metrics
    if let Some(addr) = settings.metrics.listen_addr.as_deref() {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid metrics.listen_addr: {}", addr))?;
        crawlrs_engine::infrastructure::metrics::init_metrics(addr);
    }

    // 4. Choose task source
    let source = match settings.master_taskq.redis_url.as_deref() {
        Some(redis_url) => {
            let key = settings
                .master_taskq
                .queue_key
                .clone()
                .unwrap_or_default();
            info!("Reading tasks from master task queue {}", key);
            TaskSource::Remote(Arc::new(RedisTaskQueue::new(redis_url, key)?))
        }
        None => {
            let path = settings
                .seeds
                .path
                .clone()
                .ok_or_else(|| CrawlError::Config("seeds.path is required".to_string()))?;
            let seeds = read_seeds(&path).await?;
            info!("Loaded {} seed URLs", seeds.len());
            TaskSource::from_requests(seeds)
        }
    };

    // 5. Build crawler
    let registry = HandlerRegistry::new()
        .on(crawlrs_engine::domain::models::DEFAULT_HANDLER_NAME, StatusRecorder)
        .flush_handler(STATUS_SINK, log_statuses);
    let mut builder = Crawler::builder(CrawlerConfig::from_settings(&settings))
        .handlers(registry)
        .source(source);
    if let Some(proxies) = load_proxies(&settings).await? {
        builder = builder.proxies(proxies);
    }
    let crawler = builder.build()?;

    // 6. Run
    match crawler.run().await {
        Ok(report) => {
            for (key, value) in &report.counters {
                info!("{}: {}", key, value);
            }
            for rejected in &report.rejected {
                info!(
                    "Rejected {} [{}] after {} retries: {}",
                    rejected.url, rejected.name, rejected.retry_count, rejected.reason
                );
            }
            info!(
                "Crawl {} finished in {:.2}s",
                report.run_id,
                report.elapsed.as_secs_f64()
            );
            Ok(())
        }
        Err(CrawlError::Fatal { message, context }) => {
            error!("Crawl stopped by fatal error: {} ({})", message, context);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}
