// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::request::{Method, Request};
use crate::domain::models::response::Response;
use crate::engines::traits::{Transport, TransportFactory};
use crate::proxy::Proxy;
use crate::utils::errors::{CrawlError, NetworkError};
use async_trait::async_trait;
use bytes::BytesMut;
use parking_lot::Mutex;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; crawlrs/1.0; +http://crawlrs.dev)";

/// 客户端缓存键
///
/// 代理、重定向策略和连接超时只能在客户端级别设置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    proxy: Option<Proxy>,
    follow_redirects: bool,
    max_redirects: usize,
    connect_timeout: Duration,
}

impl ClientKey {
    fn from_request(request: &Request) -> Self {
        Self {
            proxy: request.proxy().cloned(),
            follow_redirects: request.follow_redirects(),
            max_redirects: request.max_redirects(),
            connect_timeout: request.connect_timeout(),
        }
    }
}

/// 基于reqwest的传输层
///
/// 每个网络工作器持有一个实例，实例内的连接池不跨工作器共享
pub struct ReqwestTransport {
    user_agent: String,
    clients: Mutex<HashMap<ClientKey, reqwest::Client>>,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// 每个工作器创建独立实例的工厂
    pub fn factory() -> impl TransportFactory {
        |_worker_id: usize| -> Result<Box<dyn Transport>, CrawlError> {
            Ok(Box::new(ReqwestTransport::new()))
        }
    }

    fn client(&self, request: &Request) -> Result<reqwest::Client, NetworkError> {
        let key = ClientKey::from_request(request);
        if let Some(client) = self.clients.lock().get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(key.connect_timeout)
            .cookie_store(true)
            .redirect(if key.follow_redirects {
                Policy::limited(key.max_redirects)
            } else {
                Policy::none()
            });

        if let Some(proxy) = &key.proxy {
            let mut upstream = reqwest::Proxy::all(proxy.url())
                .map_err(|e| NetworkError::Proxy(format!("invalid proxy {}: {}", proxy, e)))?;
            if let Some((user, password)) = proxy.auth() {
                upstream = upstream.basic_auth(user, password);
            }
            builder = builder.proxy(upstream);
        }

        let client = builder
            .build()
            .map_err(|e| NetworkError::Connect(format!("failed to build client: {}", e)))?;
        self.clients.lock().insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let url = Url::parse(request.url())
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", request.url(), e)))?;
        let client = self.client(request)?;
        let via_proxy = request.proxy().is_some();

        let mut builder = client
            .request(to_reqwest_method(request.method()), url)
            .timeout(request.timeout());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| classify_error(&e, via_proxy))?;

        let status = response.status().as_u16();
        if via_proxy && status == 407 {
            return Err(NetworkError::Auth(
                "proxy authentication required".to_string(),
            ));
        }

        let final_url = response.url().to_string();
        let mut headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    let error = match classify_error(&e, via_proxy) {
                        NetworkError::MalformedResponse(msg) if !body.is_empty() => {
                            NetworkError::DataWrite(msg)
                        }
                        other => other,
                    };
                    if !request.is_raw() {
                        return Err(error);
                    }
                    // raw请求保留已读取的部分响应体
                    return Ok(Response {
                        status: Some(status),
                        headers,
                        body: Some(body.freeze()),
                        url: Some(final_url),
                        error: Some(error),
                        meta: HashMap::new(),
                    });
                }
            }
        }

        Ok(Response {
            status: Some(status),
            headers,
            body: Some(body.freeze()),
            url: Some(final_url),
            error: None,
            meta: HashMap::new(),
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// 把reqwest错误归入网络错误分类
pub(crate) fn classify_error(error: &reqwest::Error, via_proxy: bool) -> NetworkError {
    let message = error_chain(error);

    if error.is_timeout() {
        NetworkError::OperationTimeout(message)
    } else if error.is_redirect() {
        NetworkError::TooManyRedirects(message)
    } else if error.is_builder() {
        NetworkError::InvalidUrl(message)
    } else if error.is_connect() {
        let lower = message.to_lowercase();
        if lower.contains("dns error")
            || lower.contains("failed to lookup")
            || lower.contains("name or service not known")
        {
            NetworkError::ResolveHost(message)
        } else if via_proxy {
            NetworkError::Proxy(message)
        } else {
            NetworkError::Connect(message)
        }
    } else if error.is_body() || error.is_decode() {
        NetworkError::MalformedResponse(message)
    } else if error.is_request() {
        NetworkError::Connect(message)
    } else {
        NetworkError::MalformedResponse(message)
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[path = "reqwest_engine_test.rs"]
mod tests;
