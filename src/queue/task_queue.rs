// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::Request;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

struct QueuedRequest {
    priority: i32,
    seq: u64,
    request: Request,
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedRequest {
    // BinaryHeap 是大顶堆，这里反转比较使最小的 priority 先出队
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// 任务队列
///
/// 按优先级排序的待抓取请求队列，`priority` 越小越先出队。
/// `put` 从不阻塞，容量限制由调用方在 `put` 前检查 `size()` 实现。
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedRequest>>,
    seq: AtomicU64,
    notify: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// 按优先级插入请求
    pub fn put(&self, request: Request) {
        let entry = QueuedRequest {
            priority: request.priority(),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
            request,
        };
        self.heap.lock().push(entry);
        self.notify.notify_one();
    }

    /// 取出优先级最高（数值最小）的请求
    ///
    /// 最多等待 `timeout`，超时返回 `None`。
    /// 可以安全地在 `tokio::select!` 中被取消，不会丢失请求。
    pub async fn try_take(&self, timeout: Duration) -> Option<Request> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(entry) = self.heap.lock().pop() {
                return Some(entry.request);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.heap.lock().pop().map(|entry| entry.request);
            }
        }
    }

    /// 当前队列长度
    ///
    /// 只作为提示值使用，读取后可能立即过期
    pub fn size(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}
