// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::dataops::{DataOp, DataOpStore};
use crate::domain::models::request::Request;
use crate::infrastructure::stat::Stat;
use crate::queue::task_queue::TaskQueue;
use crate::utils::errors::HandlerError;
use crate::utils::shutdown::ShutdownFlag;
use std::sync::Arc;

/// 处理器可见的爬虫上下文
///
/// 允许处理器提交新请求、累积数据操作和读写统计计数器
#[derive(Clone)]
pub struct CrawlContext {
    taskq: Arc<TaskQueue>,
    dataops: Arc<DataOpStore>,
    stat: Arc<Stat>,
    shutdown: ShutdownFlag,
}

impl CrawlContext {
    pub(crate) fn new(
        taskq: Arc<TaskQueue>,
        dataops: Arc<DataOpStore>,
        stat: Arc<Stat>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            taskq,
            dataops,
            stat,
            shutdown,
        }
    }

    /// 直接向任务队列提交一个请求
    pub fn submit(&self, request: Request) {
        self.taskq.put(request);
    }

    /// 加入一条数据操作，达到阈值时刷新
    pub async fn enqueue_op(
        &self,
        name: &str,
        op: Option<DataOp>,
        size: Option<usize>,
    ) -> Result<(), HandlerError> {
        self.dataops.enqueue(name, op, size, false).await
    }

    /// 强制刷新指定数据批次
    pub async fn flush_op(&self, name: &str) -> Result<(), HandlerError> {
        self.dataops.flush(name).await
    }

    pub fn stat(&self) -> &Stat {
        &self.stat
    }

    /// 爬虫是否正在停止
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_set()
    }
}
