// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::dataops::DataOpStore;
use crate::domain::models::request::Request;
use crate::queue::remote::{RemoteTask, RemoteTaskQueue};
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::ErrorContext;
use crate::utils::shutdown::ShutdownFlag;
use crate::workers::coordinator::{FatalError, FatalSender};
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// 远程队列空闲时强制刷新数据批次的间隔
const REMOTE_IDLE_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// 生成器函数，参数为生成器编号
pub type GeneratorFn = Arc<dyn Fn(usize) -> BoxStream<'static, Request> + Send + Sync>;

/// 初始任务来源
#[derive(Clone, Default)]
pub enum TaskSource {
    /// 本地生成器，每个生成器任务各调用一次
    Generator(GeneratorFn),
    /// 远程共享队列，只有结束标记才表示耗尽
    Remote(Arc<dyn RemoteTaskQueue>),
    /// 没有初始任务，请求只能通过上下文提交
    #[default]
    None,
}

impl TaskSource {
    /// 由固定的请求列表构成的来源，只由0号生成器产出
    pub fn from_requests(requests: Vec<Request>) -> Self {
        let requests = Arc::new(requests);
        TaskSource::Generator(Arc::new(move |generator_id| {
            if generator_id == 0 {
                stream::iter(requests.as_ref().clone()).boxed()
            } else {
                stream::empty().boxed()
            }
        }))
    }

    /// 由生成器函数构成的来源
    pub fn generator<F>(f: F) -> Self
    where
        F: Fn(usize) -> BoxStream<'static, Request> + Send + Sync + 'static,
    {
        TaskSource::Generator(Arc::new(f))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, TaskSource::Remote(_))
    }
}

/// 任务生成器
///
/// 迭代任务来源，在任务队列低于上限时放入请求
pub struct TaskGenerator {
    generator_id: usize,
    source: TaskSource,
    taskq: Arc<TaskQueue>,
    dataops: Arc<DataOpStore>,
    shutdown: ShutdownFlag,
    fatal: FatalSender,
    taskq_limit: usize,
    poll_interval: Duration,
    backpressure_sleep: Duration,
}

impl TaskGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator_id: usize,
        source: TaskSource,
        taskq: Arc<TaskQueue>,
        dataops: Arc<DataOpStore>,
        shutdown: ShutdownFlag,
        fatal: FatalSender,
        taskq_limit: usize,
        poll_interval: Duration,
        backpressure_sleep: Duration,
    ) -> Self {
        Self {
            generator_id,
            source,
            taskq,
            dataops,
            shutdown,
            fatal,
            taskq_limit,
            poll_interval,
            backpressure_sleep,
        }
    }

    pub async fn run(self) {
        debug!("Task generator {} started", self.generator_id);
        match self.source.clone() {
            TaskSource::Generator(generator) => self.run_local(generator).await,
            TaskSource::Remote(queue) => self.run_remote(queue).await,
            TaskSource::None => {}
        }
        info!("Task generator {} finished", self.generator_id);
    }

    async fn run_local(&self, generator: GeneratorFn) {
        let mut requests = generator(self.generator_id);
        loop {
            let next = tokio::select! {
                next = requests.next() => next,
                _ = self.shutdown.wait(self.poll_interval) => {
                    if self.shutdown.is_set() {
                        return;
                    }
                    continue;
                }
            };
            match next {
                Some(request) => {
                    if !self.submit(request).await {
                        return;
                    }
                }
                None => return,
            }
        }
    }

    async fn run_remote(&self, queue: Arc<dyn RemoteTaskQueue>) {
        let mut idle_since = Instant::now();
        while !self.shutdown.is_set() {
            match queue.pop().await {
                Ok(RemoteTask::Request(request)) => {
                    if !self.submit(request).await {
                        return;
                    }
                }
                Ok(RemoteTask::Empty) => {
                    if idle_since.elapsed() >= REMOTE_IDLE_FLUSH_INTERVAL {
                        idle_since = Instant::now();
                        if let Err(e) = self.dataops.flush_all().await {
                            error!("Failed to flush data ops while idle: {}", e);
                        }
                    }
                    self.shutdown.wait(self.poll_interval).await;
                }
                Ok(RemoteTask::EndOfStream) => {
                    info!("Master task queue signalled end of stream");
                    return;
                }
                Err(e) => {
                    let mut context = ErrorContext::new();
                    context.insert("worker", format!("generator-{}", self.generator_id));
                    self.fatal.send(FatalError::new(e.to_string(), context));
                    return;
                }
            }
        }
    }

    /// 背压等待后放入请求，关闭时返回 `false`
    async fn submit(&self, request: Request) -> bool {
        while self.taskq.size() >= self.taskq_limit {
            if self.shutdown.is_set() {
                return false;
            }
            self.shutdown.wait(self.backpressure_sleep).await;
        }
        if self.shutdown.is_set() {
            return false;
        }
        self.taskq.put(request);
        true
    }
}
