// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域层模块
///
/// 包含抓取请求与响应这两个在各组件之间流动的值对象
pub mod models;
