// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 传输层特质与工厂
pub mod traits;

/// 基于reqwest的传输层实现
pub mod reqwest_engine;
