// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 爬虫入口
///
/// 组装队列、工作器和协调器，运行到静止或致命错误为止
pub mod context;
pub mod dataops;
pub mod handlers;
pub mod report;

pub use crate::workers::task_generator::TaskSource;
pub use context::CrawlContext;
pub use dataops::{DataOp, DataOpThreshold};
pub use handlers::{
    FlushHandler, HandlerRegistry, HeaderHook, ProxyHook, RejectedHandler, RequestHook,
    ResultHandler,
};
pub use report::{CrawlReport, EngineState, RejectedRequest};

use crate::config::crawler_config::CrawlerConfig;
use crate::crawler::dataops::DataOpStore;
use crate::engines::reqwest_engine::ReqwestTransport;
use crate::engines::traits::TransportFactory;
use crate::infrastructure::stat::{run_stat_logger, Stat};
use crate::proxy::ProxyList;
use crate::queue::result_queue::ResultQueue;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::{CrawlError, ErrorContext};
use crate::utils::shutdown::ShutdownFlag;
use crate::workers::coordinator::{
    fatal_channel, run_inflight_logger, spawn_guarded, FatalError, GeneratorTracker,
    InflightRegistry, QuiescenceMonitor,
};
use crate::workers::network_worker::NetworkWorker;
use crate::workers::pause::PauseGroup;
use crate::workers::result_worker::{ResultPolicy, ResultWorker};
use crate::workers::task_generator::TaskGenerator;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

/// 进行中请求日志的间隔
const INFLIGHT_LOG_INTERVAL: Duration = Duration::from_secs(3);

type ShutdownHook = Box<dyn FnOnce(&CrawlReport) + Send>;

/// 爬虫构建器
pub struct CrawlerBuilder {
    config: CrawlerConfig,
    registry: HandlerRegistry,
    source: TaskSource,
    transport: Option<Arc<dyn TransportFactory>>,
    hooks: Vec<Arc<dyn RequestHook>>,
    on_shutdown: Option<ShutdownHook>,
}

impl CrawlerBuilder {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            registry: HandlerRegistry::new(),
            source: TaskSource::None,
            transport: None,
            hooks: Vec::new(),
            on_shutdown: None,
        }
    }

    pub fn handlers(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn source(mut self, source: TaskSource) -> Self {
        self.source = source;
        self
    }

    /// 设置传输层工厂，默认为 [`ReqwestTransport`]
    pub fn transport(mut self, factory: impl TransportFactory + 'static) -> Self {
        self.transport = Some(Arc::new(factory));
        self
    }

    pub fn hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// 为没有显式代理的请求从代理列表中分配代理
    pub fn proxies(self, proxies: Arc<ProxyList>) -> Self {
        self.hook(ProxyHook::new(proxies))
    }

    /// 最终数据刷新之后调用
    pub fn on_shutdown(mut self, hook: impl FnOnce(&CrawlReport) + Send + 'static) -> Self {
        self.on_shutdown = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<Crawler, CrawlError> {
        self.config.validate()?;
        if self.source.is_remote() && self.config.task_generators != 1 {
            return Err(CrawlError::Config(format!(
                "remote task queue requires exactly one task generator, got {}",
                self.config.task_generators
            )));
        }

        let transport: Arc<dyn TransportFactory> = match self.transport {
            Some(factory) => factory,
            None => Arc::new(ReqwestTransport::factory()),
        };
        let (state_tx, _) = watch::channel(EngineState::Created);
        Ok(Crawler {
            config: self.config,
            registry: Arc::new(self.registry),
            source: self.source,
            transport,
            hooks: Arc::new(self.hooks),
            on_shutdown: self.on_shutdown,
            state: state_tx,
        })
    }
}

/// 爬虫
///
/// 一次 `run` 对应一次完整的爬取，不支持恢复
pub struct Crawler {
    config: CrawlerConfig,
    registry: Arc<HandlerRegistry>,
    source: TaskSource,
    transport: Arc<dyn TransportFactory>,
    hooks: Arc<Vec<Arc<dyn RequestHook>>>,
    on_shutdown: Option<ShutdownHook>,
    state: watch::Sender<EngineState>,
}

impl Crawler {
    pub fn builder(config: CrawlerConfig) -> CrawlerBuilder {
        CrawlerBuilder::new(config)
    }

    /// 订阅生命周期状态变化
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    fn transition(&self, state: EngineState) {
        info!("Crawler state: {}", state);
        self.state.send_replace(state);
    }

    /// 运行爬虫，直到系统静止或发生致命错误
    ///
    /// 正常结束返回汇总；致命错误返回 [`CrawlError::Fatal`]
    pub async fn run(mut self) -> Result<CrawlReport, CrawlError> {
        let config = self.config.clone();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();

        let taskq = Arc::new(TaskQueue::new());
        let resultq = Arc::new(ResultQueue::new());
        let stat = Arc::new(Stat::new());
        let shutdown = ShutdownFlag::new();
        let (fatal, mut fatal_rx) = fatal_channel();
        let pause = Arc::new(PauseGroup::new());
        let inflight = Arc::new(InflightRegistry::new(config.network_workers));
        let generators = GeneratorTracker::new();
        let rejected = Arc::new(Mutex::new(Vec::new()));
        let dataops = Arc::new(DataOpStore::new(
            self.registry.flush_handlers(),
            config.dataop_default_threshold,
            config.dataop_thresholds.clone(),
            stat.clone(),
        ));
        let ctx = CrawlContext::new(taskq.clone(), dataops.clone(), stat.clone(), shutdown.clone());

        let mut transports = Vec::with_capacity(config.network_workers);
        for worker_id in 0..config.network_workers {
            transports.push(self.transport.create(worker_id)?);
        }

        info!(%run_id, "Starting crawler");
        self.transition(EngineState::Running);

        let mut background = Vec::new();
        if config.stat_logging {
            background.push(tokio::spawn(run_stat_logger(
                stat.clone(),
                shutdown.clone(),
                config.stat_logging_interval,
                config.stat_logging_format,
            )));
        }
        if config.debug_inflight {
            background.push(tokio::spawn(run_inflight_logger(
                inflight.clone(),
                taskq.clone(),
                resultq.clone(),
                shutdown.clone(),
                INFLIGHT_LOG_INTERVAL,
            )));
        }

        let mut handles = Vec::new();
        for (worker_id, transport) in transports.into_iter().enumerate() {
            let worker = NetworkWorker::new(
                worker_id,
                transport,
                self.hooks.clone(),
                taskq.clone(),
                resultq.clone(),
                inflight.clone(),
                pause.register(),
                shutdown.clone(),
                fatal.clone(),
                config.resultq_limit,
                config.poll_interval,
                config.backpressure_sleep,
            );
            handles.push(spawn_guarded(
                format!("network-{}", worker_id),
                fatal.clone(),
                worker.run(),
            ));
        }

        let policy = ResultPolicy {
            retry_limit: config.retry_limit,
            retryable_errors: Arc::new(config.retryable_errors.clone()),
            stop_on_handler_error: config.stop_on_handler_error,
            poll_interval: config.poll_interval,
        };
        for worker_id in 0..config.result_workers {
            let worker = ResultWorker::new(
                worker_id,
                ctx.clone(),
                self.registry.clone(),
                taskq.clone(),
                resultq.clone(),
                stat.clone(),
                rejected.clone(),
                pause.register(),
                shutdown.clone(),
                fatal.clone(),
                policy.clone(),
            );
            handles.push(spawn_guarded(
                format!("result-{}", worker_id),
                fatal.clone(),
                worker.run(),
            ));
        }

        for generator_id in 0..config.task_generators {
            let guard = generators.enter();
            let generator = TaskGenerator::new(
                generator_id,
                self.source.clone(),
                taskq.clone(),
                dataops.clone(),
                shutdown.clone(),
                fatal.clone(),
                config.taskq_limit,
                config.poll_interval,
                config.backpressure_sleep,
            );
            handles.push(spawn_guarded(
                format!("generator-{}", generator_id),
                fatal.clone(),
                async move {
                    let _guard = guard;
                    generator.run().await;
                },
            ));
        }

        let monitor = QuiescenceMonitor::new(
            taskq.clone(),
            resultq.clone(),
            inflight.clone(),
            pause.clone(),
            generators,
            config.poll_interval,
            config.pause_ack_timeout,
        );

        let mut fatal_error = tokio::select! {
            fatal_error = fatal_rx.recv() => fatal_error,
            _ = monitor.wait() => None,
        };
        if let Some(fatal_error) = &fatal_error {
            fatal_error.log();
        }

        self.transition(EngineState::Draining);
        shutdown.set();
        pause.stop();
        futures::future::join_all(handles).await;

        while let Ok(extra) = fatal_rx.try_recv() {
            extra.log();
            fatal_error.get_or_insert(extra);
        }

        if let Err(e) = dataops.flush_all().await {
            error!("Final data op flush failed: {:#}", e);
            if config.stop_on_handler_error && fatal_error.is_none() {
                let fatal_flush = FatalError::new(
                    format!("Error in flush handler: {:#}", e),
                    ErrorContext::new(),
                );
                fatal_flush.log();
                fatal_error = Some(fatal_flush);
            }
        }

        futures::future::join_all(background).await;

        let report = CrawlReport {
            run_id,
            started_at,
            state: EngineState::Stopped,
            counters: stat.snapshot(),
            rejected: std::mem::take(&mut *rejected.lock()),
            elapsed: started.elapsed(),
        };

        if let Some(hook) = self.on_shutdown.take() {
            hook(&report);
        }
        self.transition(EngineState::Stopped);
        info!(
            %run_id,
            elapsed = ?report.elapsed,
            rejected = report.rejected.len(),
            "Crawler stopped"
        );

        match fatal_error {
            Some(FatalError { message, context }) => Err(CrawlError::Fatal { message, context }),
            None => Ok(report),
        }
    }
}
