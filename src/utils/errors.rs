// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::request::Request;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// 网络错误类型
///
/// 传输层的所有失败都在边界处归入这个封闭集合。
/// 这些错误只会进入重试/拒绝流程，永远不会进入致命错误通道。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// 连接失败
    #[error("connect error: {0}")]
    Connect(String),

    /// 域名解析失败
    #[error("resolve host error: {0}")]
    ResolveHost(String),

    /// 操作超时
    #[error("operation timeout: {0}")]
    OperationTimeout(String),

    /// 重定向次数过多
    #[error("too many redirects: {0}")]
    TooManyRedirects(String),

    /// 代理错误
    #[error("proxy error: {0}")]
    Proxy(String),

    /// 响应格式错误
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// 无效URL
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// 认证失败
    #[error("auth error: {0}")]
    Auth(String),

    /// 读取响应体时写入失败
    #[error("data write error: {0}")]
    DataWrite(String),
}

/// 网络错误种类
///
/// 用于配置可重试的错误集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkErrorKind {
    Connect,
    ResolveHost,
    OperationTimeout,
    TooManyRedirects,
    Proxy,
    MalformedResponse,
    InvalidUrl,
    Auth,
    DataWrite,
}

impl NetworkErrorKind {
    /// 所有错误种类
    pub const ALL: [NetworkErrorKind; 9] = [
        NetworkErrorKind::Connect,
        NetworkErrorKind::ResolveHost,
        NetworkErrorKind::OperationTimeout,
        NetworkErrorKind::TooManyRedirects,
        NetworkErrorKind::Proxy,
        NetworkErrorKind::MalformedResponse,
        NetworkErrorKind::InvalidUrl,
        NetworkErrorKind::Auth,
        NetworkErrorKind::DataWrite,
    ];

    /// 统计计数使用的稳定标签
    pub fn tag(&self) -> &'static str {
        match self {
            NetworkErrorKind::Connect => "connect-error",
            NetworkErrorKind::ResolveHost => "resolve-host-error",
            NetworkErrorKind::OperationTimeout => "operation-timeout",
            NetworkErrorKind::TooManyRedirects => "too-many-redirects",
            NetworkErrorKind::Proxy => "proxy-error",
            NetworkErrorKind::MalformedResponse => "malformed-response",
            NetworkErrorKind::InvalidUrl => "invalid-url",
            NetworkErrorKind::Auth => "auth-error",
            NetworkErrorKind::DataWrite => "data-write-error",
        }
    }
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl NetworkError {
    /// 获取错误种类
    pub fn kind(&self) -> NetworkErrorKind {
        match self {
            NetworkError::Connect(_) => NetworkErrorKind::Connect,
            NetworkError::ResolveHost(_) => NetworkErrorKind::ResolveHost,
            NetworkError::OperationTimeout(_) => NetworkErrorKind::OperationTimeout,
            NetworkError::TooManyRedirects(_) => NetworkErrorKind::TooManyRedirects,
            NetworkError::Proxy(_) => NetworkErrorKind::Proxy,
            NetworkError::MalformedResponse(_) => NetworkErrorKind::MalformedResponse,
            NetworkError::InvalidUrl(_) => NetworkErrorKind::InvalidUrl,
            NetworkError::Auth(_) => NetworkErrorKind::Auth,
            NetworkError::DataWrite(_) => NetworkErrorKind::DataWrite,
        }
    }

    /// 统计计数使用的稳定标签
    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }
}

/// 提取panic负载中的消息
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 处理器错误类型
///
/// 用户处理器（成功、拒绝、刷新）返回的错误
#[derive(Error, Debug)]
pub enum HandlerError {
    /// 数据无效，结果将按失败处理并进入重试流程
    #[error("data not valid: {0}")]
    DataNotValid(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// 把处理器中的panic转换为普通处理器错误
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        HandlerError::Other(anyhow::anyhow!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            HandlerError::DataNotValid(_) => "data-not-valid",
            HandlerError::Other(_) => "handler-error",
        }
    }
}

/// 爬虫错误类型
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("配置加载错误: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("代理列表错误: {0}")]
    ProxyList(String),

    #[error("远程任务队列错误: {0}")]
    RemoteQueue(String),

    #[error("未注册处理器: {0}")]
    MissingHandler(String),

    #[error("未注册数据刷新处理器: {0}")]
    MissingFlushHandler(String),

    #[error("致命错误: {message}")]
    Fatal {
        message: String,
        context: ErrorContext,
    },
}

/// 错误上下文
///
/// 发生错误时从正在处理的请求中收集的键值信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext(BTreeMap<String, String>);

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从请求收集上下文
    pub fn from_request(request: &Request) -> Self {
        let mut ctx = Self::new();
        ctx.insert("url", request.url());
        ctx.insert("name", request.name());
        ctx.insert("method", request.method().as_str());
        ctx.insert("priority", request.priority().to_string());
        ctx.insert("retry_count", request.retry_count().to_string());
        ctx
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("N/A");
        }
        let mut first = true;
        for (key, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
