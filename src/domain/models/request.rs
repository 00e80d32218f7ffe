// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::proxy::Proxy;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// 未指定名称时使用的处理器名称
pub const DEFAULT_HANDLER_NAME: &str = "default";

/// HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "PATCH" => Ok(Method::Patch),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(()),
        }
    }
}

/// 抓取请求
///
/// 构造之后不可变，只有 `priority` 和 `retry_count` 会被重试流程修改。
/// 请求头和代理只能在抓取前由请求钩子设置。
/// `priority` 数值越小越先被处理。
#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    name: String,
    method: Method,
    headers: HashMap<String, String>,
    body: Option<Bytes>,
    timeout: Duration,
    connect_timeout: Duration,
    proxy: Option<Proxy>,
    proxy_assigned: bool,
    follow_redirects: bool,
    max_redirects: usize,
    priority: i32,
    retry_count: u32,
    retry_limit: Option<u32>,
    extra_valid_statuses: HashSet<u16>,
    raw: bool,
    meta: HashMap<String, serde_json::Value>,
}

impl Request {
    /// 创建请求构建器
    pub fn builder(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    /// 创建GET请求构建器
    pub fn get(url: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(url)
    }

    /// 创建POST请求构建器
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> RequestBuilder {
        RequestBuilder::new(url).method(Method::Post).body(body)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// 处理器名称，结果按名称分发给已注册的处理器
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn proxy(&self) -> Option<&Proxy> {
        self.proxy.as_ref()
    }

    /// 代理是否由钩子分配（而不是构造时显式指定）
    pub fn is_proxy_assigned(&self) -> bool {
        self.proxy_assigned
    }

    pub fn follow_redirects(&self) -> bool {
        self.follow_redirects
    }

    pub fn max_redirects(&self) -> usize {
        self.max_redirects
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// 请求自身的重试上限，未设置时使用爬虫配置
    pub fn retry_limit(&self) -> Option<u32> {
        self.retry_limit
    }

    /// 实际生效的重试上限
    pub fn effective_retry_limit(&self, default_limit: u32) -> u32 {
        self.retry_limit.unwrap_or(default_limit)
    }

    pub fn extra_valid_statuses(&self) -> &HashSet<u16> {
        &self.extra_valid_statuses
    }

    /// 是否无条件接收响应
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn meta(&self) -> &HashMap<String, serde_json::Value> {
        &self.meta
    }

    /// 设置请求头（请求钩子使用）
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    /// 设置代理（代理钩子使用），每次抓取前可以重新分配
    pub fn set_proxy(&mut self, proxy: Proxy) {
        self.proxy = Some(proxy);
        self.proxy_assigned = true;
    }

    /// 尝试为请求安排一次重试
    ///
    /// 当 `retry_count < limit` 时递增重试次数、优先级减一并返回 `true`；
    /// 否则保持请求不变并返回 `false`，调用方应拒绝该请求。
    pub(crate) fn schedule_retry(&mut self, limit: u32) -> bool {
        if self.retry_count >= limit {
            return false;
        }
        self.retry_count += 1;
        self.priority = self.priority.saturating_sub(1);
        true
    }
}

/// 请求构建器
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: Request,
}

impl RequestBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            request: Request {
                url: url.into(),
                name: DEFAULT_HANDLER_NAME.to_string(),
                method: Method::Get,
                headers: HashMap::new(),
                body: None,
                timeout: Duration::from_secs(30),
                connect_timeout: Duration::from_secs(10),
                proxy: None,
                proxy_assigned: false,
                follow_redirects: true,
                max_redirects: 10,
                priority: 0,
                retry_count: 0,
                retry_limit: None,
                extra_valid_statuses: HashSet::new(),
                raw: false,
                meta: HashMap::new(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.request.name = name.into();
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.request.connect_timeout = timeout;
        self
    }

    pub fn proxy(mut self, proxy: Proxy) -> Self {
        self.request.proxy = Some(proxy);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.request.follow_redirects = follow;
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.request.max_redirects = max;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.request.priority = priority;
        self
    }

    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.request.retry_limit = Some(limit);
        self
    }

    pub fn extra_valid_status(mut self, status: u16) -> Self {
        self.request.extra_valid_statuses.insert(status);
        self
    }

    pub fn raw(mut self, raw: bool) -> Self {
        self.request.raw = raw;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.request.meta.insert(key.into(), value);
        self
    }

    pub fn build(self) -> Request {
        self.request
    }
}
