// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use crawlrs_engine::domain::models::{Request, Response};
use crawlrs_engine::engines::traits::{Transport, TransportFactory};
use crawlrs_engine::utils::errors::{CrawlError, NetworkError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// 按URL预设的抓取结果
#[derive(Clone)]
pub enum Scripted {
    Status(u16),
    ConnectError,
    ProxyError,
    Slow(Duration, u16),
}

/// 按URL返回预设结果并记录抓取顺序的传输层
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<HashMap<String, Scripted>>>,
    fetched: Arc<Mutex<Vec<String>>>,
    proxies: Arc<Mutex<Vec<Option<String>>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, scripted: Scripted) -> Self {
        self.script.lock().insert(url.to_string(), scripted);
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }

    /// 每次抓取使用的代理主机
    pub fn proxies_used(&self) -> Vec<Option<String>> {
        self.proxies.lock().clone()
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetched.lock().iter().filter(|u| *u == url).count()
    }

    /// 每个工作器一个共享脚本和记录的实例
    pub fn factory(&self) -> impl TransportFactory {
        let transport = self.clone();
        move |_worker_id: usize| -> Result<Box<dyn Transport>, CrawlError> {
            Ok(Box::new(transport.clone()))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        self.fetched.lock().push(request.url().to_string());
        self.proxies
            .lock()
            .push(request.proxy().map(|proxy| proxy.host.clone()));
        let scripted = self
            .script
            .lock()
            .get(request.url())
            .cloned()
            .unwrap_or(Scripted::Status(200));
        match scripted {
            Scripted::Status(status) => {
                Ok(Response::with_status(status).final_url(request.url()))
            }
            Scripted::ConnectError => Err(NetworkError::Connect(format!(
                "connection refused: {}",
                request.url()
            ))),
            Scripted::ProxyError => Err(NetworkError::Proxy(format!(
                "proxy refused: {}",
                request.url()
            ))),
            Scripted::Slow(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(Response::with_status(status).final_url(request.url()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
