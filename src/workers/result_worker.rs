// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::context::CrawlContext;
use crate::crawler::handlers::HandlerRegistry;
use crate::crawler::report::RejectedRequest;
use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use crate::infrastructure::stat::{
    Stat, REQUEST_FAIL, REQUEST_OK, REQUEST_PROCESSED, REQUEST_REJECTED, REQUEST_RETRY,
};
use crate::queue::result_queue::{ResultQueue, WorkItem};
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::{CrawlError, ErrorContext, HandlerError, NetworkErrorKind};
use crate::utils::shutdown::ShutdownFlag;
use crate::workers::coordinator::{FatalError, FatalSender};
use crate::workers::pause::PauseControl;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 判断结果是否成功
///
/// 原始请求总是成功；否则要求没有网络错误，且状态码在 (0, 400)、等于404或在额外有效状态中
pub fn is_result_ok(request: &Request, response: &Response) -> bool {
    if request.is_raw() {
        return true;
    }
    if response.error.is_some() {
        return false;
    }
    match response.status {
        Some(status) => {
            (status > 0 && status < 400)
                || status == 404
                || request.extra_valid_statuses().contains(&status)
        }
        None => false,
    }
}

/// 结果处理器的共享配置
#[derive(Clone)]
pub struct ResultPolicy {
    pub retry_limit: u32,
    pub retryable_errors: Arc<HashSet<NetworkErrorKind>>,
    pub stop_on_handler_error: bool,
    pub poll_interval: Duration,
}

/// 结果处理工作器
///
/// 从结果队列取出结果，调用用户处理器，失败时重试或拒绝
pub struct ResultWorker {
    worker_id: usize,
    ctx: CrawlContext,
    registry: Arc<HandlerRegistry>,
    taskq: Arc<TaskQueue>,
    resultq: Arc<ResultQueue>,
    stat: Arc<Stat>,
    rejected: Arc<Mutex<Vec<RejectedRequest>>>,
    pause: Arc<PauseControl>,
    shutdown: ShutdownFlag,
    fatal: FatalSender,
    policy: ResultPolicy,
}

impl ResultWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_id: usize,
        ctx: CrawlContext,
        registry: Arc<HandlerRegistry>,
        taskq: Arc<TaskQueue>,
        resultq: Arc<ResultQueue>,
        stat: Arc<Stat>,
        rejected: Arc<Mutex<Vec<RejectedRequest>>>,
        pause: Arc<PauseControl>,
        shutdown: ShutdownFlag,
        fatal: FatalSender,
        policy: ResultPolicy,
    ) -> Self {
        Self {
            worker_id,
            ctx,
            registry,
            taskq,
            resultq,
            stat,
            rejected,
            pause,
            shutdown,
            fatal,
            policy,
        }
    }

    /// 运行工作器循环，直到关闭标志置位
    pub async fn run(self) {
        info!("Result worker {} started", self.worker_id);

        loop {
            self.pause.checkpoint().await;
            if self.shutdown.is_set() {
                break;
            }

            let item = tokio::select! {
                _ = self.pause.pause_requested() => continue,
                item = self.resultq.try_take(self.policy.poll_interval) => item,
            };
            let Some(item) = item else {
                continue;
            };

            if let Err(mut fatal) = self.process(item).await {
                fatal
                    .context
                    .insert("worker", format!("result-{}", self.worker_id));
                self.fatal.send(fatal);
                break;
            }
        }

        self.pause.mark_stopped();
        debug!("Result worker {} stopped", self.worker_id);
    }

    async fn process(&self, item: WorkItem) -> Result<(), FatalError> {
        let WorkItem { request, response } = item;
        self.stat.inc(REQUEST_PROCESSED);

        if is_result_ok(&request, &response) {
            self.process_ok(request, response).await
        } else {
            self.process_fail(request, response).await
        }
    }

    async fn process_ok(&self, request: Request, response: Response) -> Result<(), FatalError> {
        self.stat.inc(REQUEST_OK);

        let handler = self.registry.handler(request.name()).ok_or_else(|| {
            FatalError::new(
                CrawlError::MissingHandler(request.name().to_string()).to_string(),
                ErrorContext::from_request(&request),
            )
        })?;

        let outcome = AssertUnwindSafe(handler.handle(&self.ctx, &request, &response))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));
        match outcome {
            Ok(new_requests) => {
                for new_request in new_requests {
                    self.taskq.put(new_request);
                }
                Ok(())
            }
            Err(e) => {
                self.stat
                    .inc(&format!("result-handler-error:{}", e.tag()));
                if let HandlerError::DataNotValid(reason) = &e {
                    debug!("Data not valid for {}: {}", request.url(), reason);
                    return self.process_fail(request, response).await;
                }
                self.handler_error("result handler", e, &request)
            }
        }
    }

    async fn process_fail(
        &self,
        mut request: Request,
        response: Response,
    ) -> Result<(), FatalError> {
        self.stat.inc(REQUEST_FAIL);
        if let Some(error) = &response.error {
            self.stat.inc(&format!("network-error:{}", error.tag()));
        }
        if let Some(status) = response.status {
            self.stat.inc(&format!("http:status-{}", status));
        }

        let retryable = response
            .error
            .as_ref()
            .map(|error| self.policy.retryable_errors.contains(&error.kind()))
            .unwrap_or(true);
        let limit = request.effective_retry_limit(self.policy.retry_limit);

        if retryable && request.schedule_retry(limit) {
            self.stat.inc(REQUEST_RETRY);
            debug!(
                "Retrying {} ({}/{})",
                request.url(),
                request.retry_count(),
                limit
            );
            self.taskq.put(request);
            return Ok(());
        }

        self.stat.inc(REQUEST_REJECTED);
        warn!(
            "Rejected {} after {} retries",
            request.url(),
            request.retry_count()
        );
        self.rejected
            .lock()
            .push(RejectedRequest::new(&request, &response));

        if let Some(handler) = self.registry.rejected_handler(request.name()) {
            let outcome = AssertUnwindSafe(handler.rejected(&self.ctx, &request, &response))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)));
            if let Err(e) = outcome {
                self.stat
                    .inc(&format!("rejected-handler-error:{}", e.tag()));
                return self.handler_error("rejected handler", e, &request);
            }
        }
        Ok(())
    }

    fn handler_error(
        &self,
        kind: &str,
        e: HandlerError,
        request: &Request,
    ) -> Result<(), FatalError> {
        let context = ErrorContext::from_request(request);
        if self.policy.stop_on_handler_error {
            return Err(FatalError::new(format!("Error in {}: {:#}", kind, e), context));
        }
        error!(
            url = %request.url(),
            name = %request.name(),
            context = %context,
            "Error in {}: {:#}",
            kind,
            e
        );
        Ok(())
    }
}
