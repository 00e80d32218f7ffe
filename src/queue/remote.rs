// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::{Method, Request, DEFAULT_HANDLER_NAME};
use crate::utils::errors::CrawlError;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;

/// 远程队列的一次弹出结果
#[derive(Debug)]
pub enum RemoteTask {
    /// 一个新请求
    Request(Request),
    /// 暂时没有任务，不代表结束
    Empty,
    /// 显式的结束标记
    EndOfStream,
}

/// 远程共享任务队列
///
/// 只有显式的结束标记才表示任务来源耗尽
#[async_trait]
pub trait RemoteTaskQueue: Send + Sync {
    async fn pop(&self) -> Result<RemoteTask, CrawlError>;
}

/// 远程任务的JSON结构
#[derive(Debug, Deserialize)]
struct RemoteTaskData {
    url: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    method: Option<Method>,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    priority: Option<i32>,
    /// 超时时间（秒）
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    retry_limit: Option<u32>,
    #[serde(default)]
    raw: bool,
    #[serde(default)]
    meta: HashMap<String, serde_json::Value>,
}

impl RemoteTaskData {
    fn into_request(self) -> Request {
        let mut builder = Request::get(self.url)
            .name(self.name.unwrap_or_else(|| DEFAULT_HANDLER_NAME.to_string()))
            .method(self.method.unwrap_or_default())
            .headers(self.headers)
            .priority(self.priority.unwrap_or(0))
            .raw(self.raw);
        if let Some(body) = self.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }
        if let Some(limit) = self.retry_limit {
            builder = builder.retry_limit(limit);
        }
        for (key, value) in self.meta {
            builder = builder.meta(key, value);
        }
        builder.build()
    }
}

/// 解析一条远程任务
///
/// `{"$op": "shutdown"}` 是结束标记，其他 `$op` 视为配置错误
pub fn parse_remote_task(payload: &str) -> Result<RemoteTask, CrawlError> {
    let value: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| CrawlError::RemoteQueue(format!("invalid task payload: {}", e)))?;

    if let Some(op) = value.get("$op") {
        return match op.as_str() {
            Some("shutdown") => Ok(RemoteTask::EndOfStream),
            _ => Err(CrawlError::Config(format!(
                "got invalid $op from master task queue: {}",
                op
            ))),
        };
    }

    let data: RemoteTaskData = serde_json::from_value(value)
        .map_err(|e| CrawlError::RemoteQueue(format!("invalid task payload: {}", e)))?;
    Ok(RemoteTask::Request(data.into_request()))
}

/// 基于Redis列表的远程任务队列
///
/// 使用 `LPOP` 从列表头部取任务
pub struct RedisTaskQueue {
    client: redis::Client,
    key: String,
    connection: OnceCell<MultiplexedConnection>,
}

impl RedisTaskQueue {
    /// 创建Redis任务队列
    ///
    /// # 参数
    ///
    /// * `redis_url` - Redis连接URL
    /// * `key` - 任务列表的键
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, CrawlError> {
        let key = key.into();
        if key.is_empty() {
            return Err(CrawlError::Config("master task queue key is empty".to_string()));
        }
        let client = redis::Client::open(redis_url)
            .map_err(|e| CrawlError::RemoteQueue(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            key,
            connection: OnceCell::new(),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, CrawlError> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| CrawlError::RemoteQueue(format!("redis connect failed: {}", e)))
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl RemoteTaskQueue for RedisTaskQueue {
    async fn pop(&self) -> Result<RemoteTask, CrawlError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .lpop(&self.key, None)
            .await
            .map_err(|e| CrawlError::RemoteQueue(format!("LPOP {} failed: {}", self.key, e)))?;
        match payload {
            Some(payload) => parse_remote_task(&payload),
            None => Ok(RemoteTask::Empty),
        }
    }
}
