// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::Request;
use crate::queue::result_queue::ResultQueue;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::{panic_message, ErrorContext};
use crate::utils::shutdown::ShutdownFlag;
use crate::workers::pause::PauseGroup;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};
use url::Url;

/// 发送到致命通道的错误
#[derive(Debug, Clone)]
pub struct FatalError {
    pub message: String,
    pub context: ErrorContext,
}

impl FatalError {
    pub fn new(message: impl Into<String>, context: ErrorContext) -> Self {
        Self {
            message: message.into(),
            context,
        }
    }

    /// 记录错误及其上下文
    pub fn log(&self) {
        error!("Fatal error: {}", self.message);
        if self.context.is_empty() {
            error!("Error context: N/A");
        } else {
            error!("Error context:");
            for (key, value) in self.context.iter() {
                error!(" * {}: {}", key, value);
            }
        }
    }
}

/// 致命通道的发送端
#[derive(Clone)]
pub struct FatalSender {
    tx: mpsc::UnboundedSender<FatalError>,
}

impl FatalSender {
    pub fn send(&self, fatal: FatalError) {
        if self.tx.send(fatal).is_err() {
            debug!("Fatal channel closed, dropping error");
        }
    }
}

pub type FatalReceiver = mpsc::UnboundedReceiver<FatalError>;

/// 创建致命通道
pub fn fatal_channel() -> (FatalSender, FatalReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FatalSender { tx }, rx)
}

/// 启动一个工作器任务
///
/// 工作器中的panic被捕获并发送到致命通道
pub fn spawn_guarded<F>(worker: String, fatal: FatalSender, future: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
            let mut context = ErrorContext::new();
            context.insert("worker", worker.as_str());
            fatal.send(FatalError::new(
                format!("worker {} panicked: {}", worker, panic_message(panic.as_ref())),
                context,
            ));
        }
    })
}

#[derive(Default)]
struct InflightSlot {
    request: Option<(String, u32)>,
    started: Option<Instant>,
}

/// 网络工作器的进行中请求登记
///
/// 协调器通过它判断是否有工作器正在抓取
pub struct InflightRegistry {
    slots: Vec<Mutex<InflightSlot>>,
    active: AtomicUsize,
}

impl InflightRegistry {
    pub fn new(workers: usize) -> Self {
        Self {
            slots: (0..workers).map(|_| Mutex::new(InflightSlot::default())).collect(),
            active: AtomicUsize::new(0),
        }
    }

    /// 标记工作器开始处理请求
    pub fn activate(&self, worker: usize, request: &Request) {
        let mut slot = self.slots[worker].lock();
        if slot.request.is_none() {
            self.active.fetch_add(1, Ordering::SeqCst);
        }
        slot.request = Some((request.url().to_string(), request.retry_count()));
        slot.started = Some(Instant::now());
    }

    /// 标记工作器空闲
    pub fn deactivate(&self, worker: usize) {
        let mut slot = self.slots[worker].lock();
        if slot.request.take().is_some() {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        slot.started = None;
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// 进行中的请求：(已用时间, 重试次数, 主机)，按用时从长到短排列
    pub fn snapshot(&self) -> Vec<(Duration, u32, String)> {
        let mut entries: Vec<_> = self
            .slots
            .iter()
            .filter_map(|slot| {
                let slot = slot.lock();
                let (url, retry_count) = slot.request.as_ref()?;
                let host = Url::parse(url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| "NA".to_string());
                let elapsed = slot.started.map(|s| s.elapsed()).unwrap_or_default();
                Some((elapsed, *retry_count, host))
            })
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries
    }
}

/// 任务生成器计数
///
/// 每个生成器持有一个守卫，守卫释放时（包括panic）计数减一
#[derive(Clone, Default)]
pub struct GeneratorTracker {
    live: Arc<AtomicUsize>,
}

pub struct GeneratorGuard {
    live: Arc<AtomicUsize>,
}

impl Drop for GeneratorGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl GeneratorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GeneratorGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        GeneratorGuard {
            live: self.live.clone(),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// 静止检测
///
/// 所有生成器退出后反复检查系统是否空闲，再通过暂停屏障确认
pub struct QuiescenceMonitor {
    taskq: Arc<TaskQueue>,
    resultq: Arc<ResultQueue>,
    inflight: Arc<InflightRegistry>,
    pause: Arc<PauseGroup>,
    generators: GeneratorTracker,
    poll_interval: Duration,
    pause_ack_timeout: Duration,
}

impl QuiescenceMonitor {
    pub fn new(
        taskq: Arc<TaskQueue>,
        resultq: Arc<ResultQueue>,
        inflight: Arc<InflightRegistry>,
        pause: Arc<PauseGroup>,
        generators: GeneratorTracker,
        poll_interval: Duration,
        pause_ack_timeout: Duration,
    ) -> Self {
        Self {
            taskq,
            resultq,
            inflight,
            pause,
            generators,
            poll_interval,
            pause_ack_timeout,
        }
    }

    pub fn system_is_busy(&self) -> bool {
        self.taskq.size() > 0 || self.resultq.size() > 0 || self.inflight.active_count() > 0
    }

    /// 等待系统静止
    ///
    /// 返回时所有工作器处于暂停状态且队列为空
    pub async fn wait(&self) {
        while self.generators.live() > 0 {
            tokio::time::sleep(self.poll_interval).await;
        }
        debug!("All task generators finished");

        loop {
            if self.system_is_busy() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            self.pause.request_pause();
            if self.pause.wait_paused(self.pause_ack_timeout).await {
                if !self.system_is_busy() {
                    info!("Crawler is quiescent");
                    return;
                }
                debug!("Work appeared while pausing, resuming workers");
            } else {
                debug!("Not all workers acknowledged pause, resuming");
            }
            self.pause.resume();
        }
    }
}

/// 周期性输出进行中请求与队列大小
pub async fn run_inflight_logger(
    inflight: Arc<InflightRegistry>,
    taskq: Arc<TaskQueue>,
    resultq: Arc<ResultQueue>,
    shutdown: ShutdownFlag,
    interval: Duration,
) {
    while !shutdown.is_set() {
        let entries = inflight.snapshot();
        for (elapsed, retry_count, host) in &entries {
            debug!(
                "{:.2} - [#{}] - {}",
                elapsed.as_secs_f64(),
                retry_count,
                host
            );
        }
        let total: f64 = entries.iter().map(|(e, _, _)| e.as_secs_f64()).sum();
        let average = if entries.is_empty() {
            0.0
        } else {
            total / entries.len() as f64
        };
        debug!(
            "Active handlers: {} | Idle handlers: {} | Taskq size: {} | Resultq size: {} | Average handler time: {:.2}",
            entries.len(),
            inflight.worker_count() - inflight.active_count().min(inflight.worker_count()),
            taskq.size(),
            resultq.size(),
            average
        );
        shutdown.wait(interval).await;
    }
}
