// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域模型模块
///
/// - 请求（request）：一次抓取的描述，以及重试状态
/// - 响应（response）：抓取结果，状态码或网络错误
pub mod request;
pub mod response;

pub use request::{Method, Request, RequestBuilder, DEFAULT_HANDLER_NAME};
pub use response::Response;
