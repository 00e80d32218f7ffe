// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// 暂停状态下重新检查状态的间隔
const PAUSED_RECHECK_INTERVAL: Duration = Duration::from_millis(50);

/// 单个工作器的暂停状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Running,
    PauseRequested,
    Paused,
    Stopped,
}

/// 单个工作器的暂停控制
///
/// 工作器只在循环边界（不持有任何请求时）调用 [`PauseControl::checkpoint`] 确认暂停
pub struct PauseControl {
    state: Mutex<PauseState>,
    resumed: Notify,
    requested: Notify,
    acked: Arc<Notify>,
}

impl PauseControl {
    fn new(acked: Arc<Notify>) -> Self {
        Self {
            state: Mutex::new(PauseState::Running),
            resumed: Notify::new(),
            requested: Notify::new(),
            acked,
        }
    }

    pub fn state(&self) -> PauseState {
        *self.state.lock()
    }

    /// 循环边界检查点
    ///
    /// 有暂停请求时确认暂停，并等待恢复或停止
    pub async fn checkpoint(&self) {
        {
            let mut state = self.state.lock();
            if *state != PauseState::PauseRequested {
                return;
            }
            *state = PauseState::Paused;
        }
        self.acked.notify_waiters();

        loop {
            let resumed = self.resumed.notified();
            tokio::pin!(resumed);
            resumed.as_mut().enable();
            if self.state() != PauseState::Paused {
                return;
            }
            let _ = tokio::time::timeout(PAUSED_RECHECK_INTERVAL, resumed).await;
        }
    }

    /// 等到出现暂停请求为止
    ///
    /// 与队列等待一起放在 `select!` 中，使空闲的工作器能及时响应暂停
    pub async fn pause_requested(&self) {
        loop {
            let requested = self.requested.notified();
            tokio::pin!(requested);
            requested.as_mut().enable();
            if self.state() == PauseState::PauseRequested {
                return;
            }
            requested.await;
        }
    }

    /// 工作器退出时调用
    pub fn mark_stopped(&self) {
        *self.state.lock() = PauseState::Stopped;
        self.acked.notify_waiters();
    }

    fn request(&self) {
        let mut state = self.state.lock();
        if *state == PauseState::Running {
            *state = PauseState::PauseRequested;
            drop(state);
            self.requested.notify_waiters();
        }
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if matches!(*state, PauseState::PauseRequested | PauseState::Paused) {
            *state = PauseState::Running;
            drop(state);
            self.resumed.notify_waiters();
        }
    }

    fn stop(&self) {
        *self.state.lock() = PauseState::Stopped;
        self.resumed.notify_waiters();
    }

    fn is_frozen(&self) -> bool {
        matches!(self.state(), PauseState::Paused | PauseState::Stopped)
    }
}

/// 一组工作器的暂停屏障
///
/// 协调器发起暂停，在限定时间内等待全部确认，未全部确认时放弃并恢复
#[derive(Default)]
pub struct PauseGroup {
    workers: Mutex<Vec<Arc<PauseControl>>>,
    acked: Arc<Notify>,
}

impl PauseGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为一个新工作器创建暂停控制
    pub fn register(&self) -> Arc<PauseControl> {
        let control = Arc::new(PauseControl::new(self.acked.clone()));
        self.workers.lock().push(control.clone());
        control
    }

    fn snapshot(&self) -> Vec<Arc<PauseControl>> {
        self.workers.lock().clone()
    }

    /// 向所有工作器发出暂停请求
    pub fn request_pause(&self) {
        for worker in self.snapshot() {
            worker.request();
        }
    }

    /// 所有工作器是否都已暂停或退出
    pub fn all_paused(&self) -> bool {
        self.snapshot().iter().all(|worker| worker.is_frozen())
    }

    /// 等待所有工作器确认暂停，最多等待 `timeout`
    pub async fn wait_paused(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let acked = self.acked.notified();
            tokio::pin!(acked);
            acked.as_mut().enable();
            if self.all_paused() {
                return true;
            }
            if tokio::time::timeout_at(deadline, acked).await.is_err() {
                return self.all_paused();
            }
        }
    }

    /// 放弃暂停，已确认的工作器立即恢复
    pub fn resume(&self) {
        for worker in self.snapshot() {
            worker.resume();
        }
    }

    /// 停止所有工作器，已暂停的工作器被释放后退出循环
    pub fn stop(&self) {
        for worker in self.snapshot() {
            worker.stop();
        }
    }
}
