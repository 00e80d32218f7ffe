// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 网络工作器、结果处理器、任务生成器，以及负责静止检测和致命错误的协调器
pub mod coordinator;
pub mod network_worker;
pub mod pause;
pub mod result_worker;
pub mod task_generator;
