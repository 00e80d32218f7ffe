// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置，以及传给爬虫的运行配置
pub mod crawler_config;
pub mod settings;
