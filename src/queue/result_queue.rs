// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// 抓取结果
///
/// 网络工作器完成一次抓取后推入结果队列的 `(请求, 响应)` 对
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub request: Request,
    pub response: Response,
}

/// 结果队列
///
/// 不排序，结果处理器取到哪个就处理哪个。
/// 上限由网络工作器在抓取前检查 `size()` 实现。
#[derive(Default)]
pub struct ResultQueue {
    items: Mutex<VecDeque<WorkItem>>,
    notify: Notify,
}

impl ResultQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, item: WorkItem) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// 取出一个结果，最多等待 `timeout`
    pub async fn try_take(&self, timeout: Duration) -> Option<WorkItem> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(item) = self.items.lock().pop_front() {
                return Some(item);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.items.lock().pop_front();
            }
        }
    }

    pub fn size(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
