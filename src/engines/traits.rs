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

use crate::domain::models::request::Request;
use crate::domain::models::response::Response;
use crate::utils::errors::{CrawlError, NetworkError};
use async_trait::async_trait;

/// 传输层特质
///
/// 执行一次抓取。实现必须把所有传输层失败转换为 [`NetworkError`]，
/// 不允许泄漏具体HTTP库的错误类型。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 执行抓取
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;

    /// 传输层名称
    fn name(&self) -> &'static str;
}

/// 传输层工厂
///
/// 每个网络工作器启动时调用一次，工作器之间不共享连接池
pub trait TransportFactory: Send + Sync {
    fn create(&self, worker_id: usize) -> Result<Box<dyn Transport>, CrawlError>;
}

impl<F> TransportFactory for F
where
    F: Fn(usize) -> Result<Box<dyn Transport>, CrawlError> + Send + Sync,
{
    fn create(&self, worker_id: usize) -> Result<Box<dyn Transport>, CrawlError> {
        (self)(worker_id)
    }
}
