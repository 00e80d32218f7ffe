// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 代理模块
///
/// 提供代理服务器的描述以及代理列表的加载与轮换
pub mod proxy_list;

pub use proxy_list::{Proxy, ProxyList, ProxyRotation, ProxyScheme, ProxySource};
