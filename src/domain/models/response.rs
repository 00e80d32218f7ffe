// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::NetworkError;
use bytes::Bytes;
use std::borrow::Cow;
use std::collections::HashMap;

/// 抓取响应
///
/// 完成的抓取要么带有状态码，要么带有错误。
/// 例外：raw请求在读取中途失败时可能同时带有部分响应体和错误。
#[derive(Debug, Clone, Default)]
pub struct Response {
    /// HTTP状态码
    pub status: Option<u16>,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应内容
    pub body: Option<Bytes>,
    /// 最终URL（跟随重定向之后）
    pub url: Option<String>,
    /// 网络错误
    pub error: Option<NetworkError>,
    /// 附加信息
    pub meta: HashMap<String, serde_json::Value>,
}

impl Response {
    /// 创建成功响应
    pub fn with_status(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// 创建失败响应
    pub fn from_error(error: NetworkError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn final_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// 响应体文本（非法UTF-8按替换字符处理）
    pub fn text(&self) -> Cow<'_, str> {
        match &self.body {
            Some(body) => String::from_utf8_lossy(body),
            None => Cow::Borrowed(""),
        }
    }
}
