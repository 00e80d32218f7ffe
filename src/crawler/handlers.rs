// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::crawler::context::CrawlContext;
use crate::crawler::dataops::DataOp;
use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use crate::proxy::ProxyList;
use crate::utils::errors::HandlerError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// 成功结果处理器
///
/// 按请求的逻辑名称注册。返回的新请求会立即放回任务队列。
#[async_trait]
pub trait ResultHandler: Send + Sync {
    async fn handle(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        response: &Response,
    ) -> Result<Vec<Request>, HandlerError>;
}

#[async_trait]
impl<F> ResultHandler for F
where
    F: Fn(&CrawlContext, &Request, &Response) -> Result<Vec<Request>, HandlerError>
        + Send
        + Sync,
{
    async fn handle(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        response: &Response,
    ) -> Result<Vec<Request>, HandlerError> {
        (self)(ctx, request, response)
    }
}

/// 重试耗尽后的拒绝处理器，默认什么也不做
#[async_trait]
pub trait RejectedHandler: Send + Sync {
    async fn rejected(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        response: &Response,
    ) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F> RejectedHandler for F
where
    F: Fn(&CrawlContext, &Request, &Response) -> Result<(), HandlerError> + Send + Sync,
{
    async fn rejected(
        &self,
        ctx: &CrawlContext,
        request: &Request,
        response: &Response,
    ) -> Result<(), HandlerError> {
        (self)(ctx, request, response)
    }
}

/// 数据批次刷新处理器
///
/// 调用时不持有任何内部锁
#[async_trait]
pub trait FlushHandler: Send + Sync {
    async fn flush(&self, name: &str, ops: Vec<DataOp>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F> FlushHandler for F
where
    F: Fn(&str, Vec<DataOp>) -> Result<(), HandlerError> + Send + Sync,
{
    async fn flush(&self, name: &str, ops: Vec<DataOp>) -> Result<(), HandlerError> {
        (self)(name, ops)
    }
}

/// 请求钩子
///
/// 网络工作器在每次抓取前调用，用于注入请求头或分配代理。
/// 钩子出错属于程序错误，会导致爬虫致命停止。
pub trait RequestHook: Send + Sync {
    fn setup_request(&self, request: &mut Request) -> anyhow::Result<()>;
}

/// 为没有显式代理的请求分配代理
///
/// 每次抓取前重新选择，重试不会沿用上一次的代理
pub struct ProxyHook {
    proxies: Arc<ProxyList>,
}

impl ProxyHook {
    pub fn new(proxies: Arc<ProxyList>) -> Self {
        Self { proxies }
    }
}

impl RequestHook for ProxyHook {
    fn setup_request(&self, request: &mut Request) -> anyhow::Result<()> {
        if request.proxy().is_none() || request.is_proxy_assigned() {
            request.set_proxy(self.proxies.select());
        }
        Ok(())
    }
}

/// 为缺少指定请求头的请求补充默认值
#[derive(Debug, Clone, Default)]
pub struct HeaderHook {
    headers: HashMap<String, String>,
}

impl HeaderHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

impl RequestHook for HeaderHook {
    fn setup_request(&self, request: &mut Request) -> anyhow::Result<()> {
        for (name, value) in &self.headers {
            let present = request
                .headers()
                .keys()
                .any(|existing| existing.eq_ignore_ascii_case(name));
            if !present {
                request.set_header(name.clone(), value.clone());
            }
        }
        Ok(())
    }
}

/// 处理器注册表
///
/// 成功处理器缺失是致命错误；拒绝处理器缺失时使用空实现。
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ResultHandler>>,
    rejected: HashMap<String, Arc<dyn RejectedHandler>>,
    flush: HashMap<String, Arc<dyn FlushHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册成功处理器
    pub fn on(mut self, name: impl Into<String>, handler: impl ResultHandler + 'static) -> Self {
        self.handlers.insert(name.into(), Arc::new(handler));
        self
    }

    /// 注册拒绝处理器
    pub fn on_rejected(
        mut self,
        name: impl Into<String>,
        handler: impl RejectedHandler + 'static,
    ) -> Self {
        self.rejected.insert(name.into(), Arc::new(handler));
        self
    }

    /// 注册数据批次刷新处理器
    pub fn flush_handler(
        mut self,
        name: impl Into<String>,
        handler: impl FlushHandler + 'static,
    ) -> Self {
        self.flush.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn handler(&self, name: &str) -> Option<Arc<dyn ResultHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn rejected_handler(&self, name: &str) -> Option<Arc<dyn RejectedHandler>> {
        self.rejected.get(name).cloned()
    }

    pub(crate) fn flush_handlers(&self) -> HashMap<String, Arc<dyn FlushHandler>> {
        self.flush.clone()
    }
}
