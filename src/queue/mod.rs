// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 队列模块
///
/// 提供任务队列、结果队列以及远程共享任务队列
pub mod remote;
pub mod result_queue;
pub mod task_queue;
