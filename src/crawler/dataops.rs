// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::handlers::FlushHandler;
use crate::infrastructure::stat::Stat;
use crate::utils::errors::{CrawlError, HandlerError};
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

/// 一条待批量写入的数据操作
pub type DataOp = serde_json::Value;

/// 数据批次刷新阈值
///
/// 任一阈值达到即刷新，`None` 表示不按该维度刷新
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DataOpThreshold {
    pub count: Option<usize>,
    pub size: Option<usize>,
}

impl Default for DataOpThreshold {
    fn default() -> Self {
        Self {
            count: Some(500),
            size: None,
        }
    }
}

impl DataOpThreshold {
    fn reached(&self, count: usize, size_bytes: usize) -> bool {
        let by_count = matches!(self.count, Some(th) if th > 0 && count >= th);
        let by_size = matches!(self.size, Some(th) if th > 0 && size_bytes >= th);
        by_count || by_size
    }
}

#[derive(Debug, Default)]
struct SinkBatch {
    pending: Vec<DataOp>,
    count: usize,
    size_bytes: usize,
}

/// 按名称分区的数据批次存储
///
/// 每个名称一把锁，互不相关的批次不会互相阻塞。
/// 刷新时先在锁内换出待处理列表，释放锁后再调用刷新处理器。
pub struct DataOpStore {
    sinks: DashMap<String, Arc<Mutex<SinkBatch>>>,
    handlers: HashMap<String, Arc<dyn FlushHandler>>,
    default_threshold: DataOpThreshold,
    thresholds: HashMap<String, DataOpThreshold>,
    stat: Arc<Stat>,
}

impl DataOpStore {
    pub fn new(
        handlers: HashMap<String, Arc<dyn FlushHandler>>,
        default_threshold: DataOpThreshold,
        thresholds: HashMap<String, DataOpThreshold>,
        stat: Arc<Stat>,
    ) -> Self {
        Self {
            sinks: DashMap::new(),
            handlers,
            default_threshold,
            thresholds,
            stat,
        }
    }

    fn threshold(&self, name: &str) -> DataOpThreshold {
        self.thresholds
            .get(name)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    fn batch(&self, name: &str) -> Arc<Mutex<SinkBatch>> {
        if let Some(batch) = self.sinks.get(name) {
            return batch.clone();
        }
        self.sinks.entry(name.to_string()).or_default().clone()
    }

    /// 加入一条数据操作
    ///
    /// `op` 为 `None` 时只检查阈值；`force` 为真时无论阈值都刷新。
    pub async fn enqueue(
        &self,
        name: &str,
        op: Option<DataOp>,
        size: Option<usize>,
        force: bool,
    ) -> Result<(), HandlerError> {
        let threshold = self.threshold(name);
        let batch = self.batch(name);

        let ops = {
            let mut batch = batch.lock();
            if let Some(op) = op {
                batch.pending.push(op);
                batch.count += 1;
                batch.size_bytes += size.unwrap_or(0);
            }
            if !force && !threshold.reached(batch.count, batch.size_bytes) {
                return Ok(());
            }
            self.stat.inc(&format!("dataop-dump-{}", name));
            batch.count = 0;
            batch.size_bytes = 0;
            std::mem::take(&mut batch.pending)
        };

        if ops.is_empty() {
            return Ok(());
        }

        let handler = self.handlers.get(name).cloned().ok_or_else(|| {
            HandlerError::Other(CrawlError::MissingFlushHandler(name.to_string()).into())
        })?;
        debug!("Flushing {} data ops to sink {}", ops.len(), name);
        AssertUnwindSafe(handler.flush(name, ops))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::from_panic(panic)))
    }

    /// 强制刷新指定批次
    pub async fn flush(&self, name: &str) -> Result<(), HandlerError> {
        self.enqueue(name, None, None, true).await
    }

    /// 强制刷新所有批次
    ///
    /// 单个批次失败不影响其他批次，返回第一个错误
    pub async fn flush_all(&self) -> Result<(), HandlerError> {
        let names: Vec<String> = self.sinks.iter().map(|entry| entry.key().clone()).collect();
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.flush(&name).await {
                error!("Failed to flush data ops for sink {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// 当前待刷新的数量
    pub fn pending(&self, name: &str) -> usize {
        self.sinks
            .get(name)
            .map(|batch| batch.lock().pending.len())
            .unwrap_or(0)
    }
}
