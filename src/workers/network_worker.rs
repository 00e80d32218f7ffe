// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::handlers::RequestHook;
use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use crate::engines::traits::Transport;
use crate::queue::result_queue::{ResultQueue, WorkItem};
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::ErrorContext;
use crate::utils::shutdown::ShutdownFlag;
use crate::workers::coordinator::{FatalError, FatalSender, InflightRegistry};
use crate::workers::pause::PauseControl;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// 网络工作器
///
/// 独占一个传输层实例，从任务队列取请求、抓取并把结果放入结果队列
pub struct NetworkWorker {
    worker_id: usize,
    transport: Box<dyn Transport>,
    hooks: Arc<Vec<Arc<dyn RequestHook>>>,
    taskq: Arc<TaskQueue>,
    resultq: Arc<ResultQueue>,
    inflight: Arc<InflightRegistry>,
    pause: Arc<PauseControl>,
    shutdown: ShutdownFlag,
    fatal: FatalSender,
    resultq_limit: usize,
    poll_interval: Duration,
    backpressure_sleep: Duration,
}

impl NetworkWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        transport: Box<dyn Transport>,
        hooks: Arc<Vec<Arc<dyn RequestHook>>>,
        taskq: Arc<TaskQueue>,
        resultq: Arc<ResultQueue>,
        inflight: Arc<InflightRegistry>,
        pause: Arc<PauseControl>,
        shutdown: ShutdownFlag,
        fatal: FatalSender,
        resultq_limit: usize,
        poll_interval: Duration,
        backpressure_sleep: Duration,
    ) -> Self {
        Self {
            worker_id,
            transport,
            hooks,
            taskq,
            resultq,
            inflight,
            pause,
            shutdown,
            fatal,
            resultq_limit,
            poll_interval,
            backpressure_sleep,
        }
    }

    /// 运行工作器循环，直到关闭标志置位
    pub async fn run(self) {
        info!(
            "Network worker {} started ({})",
            self.worker_id,
            self.transport.name()
        );

        loop {
            self.pause.checkpoint().await;
            if self.shutdown.is_set() {
                break;
            }

            if self.resultq.size() >= self.resultq_limit {
                tokio::time::sleep(self.backpressure_sleep).await;
                continue;
            }

            let request = tokio::select! {
                _ = self.pause.pause_requested() => continue,
                request = self.taskq.try_take(self.poll_interval) => request,
            };
            let Some(request) = request else {
                continue;
            };

            self.inflight.activate(self.worker_id, &request);
            let context = ErrorContext::from_request(&request);
            let outcome = self.fetch(request).await;
            match outcome {
                Ok(item) => {
                    self.resultq.put(item);
                    self.inflight.deactivate(self.worker_id);
                }
                Err(e) => {
                    self.inflight.deactivate(self.worker_id);
                    let mut context = context;
                    context.insert("worker", format!("network-{}", self.worker_id));
                    self.fatal.send(FatalError::new(format!("{:#}", e), context));
                    break;
                }
            }
        }

        self.pause.mark_stopped();
        debug!("Network worker {} stopped", self.worker_id);
    }

    /// 执行请求钩子并抓取
    ///
    /// 网络错误转换为带错误的响应；钩子错误属于程序错误，原样返回
    async fn fetch(&self, mut request: Request) -> anyhow::Result<WorkItem> {
        for hook in self.hooks.iter() {
            hook.setup_request(&mut request)?;
        }

        let response = match self.transport.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("Fetch {} failed: {}", request.url(), e);
                Response::from_error(e)
            }
        };

        Ok(WorkItem { request, response })
    }
}
