use std::fmt::Display;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::error::{Error, Result};

/// Worker 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    /// 安装完成，等待激活
    Installed,
    Activating,
    /// 正在接管请求
    Activated,
    /// 安装失败或已被新版本取代
    Redundant,
}

impl WorkerState {
    /// 状态只能前进，不会回退
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;

        matches!(
            (self, next),
            (Installing, Installed)
                | (Installing, Redundant)
                | (Installed, Activating)
                | (Installed, Redundant)
                | (Activating, Activated)
                | (Activated, Redundant)
        )
    }
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use WorkerState::*;

        let res = match self {
            Installing => "installing",
            Installed => "installed",
            Activating => "activating",
            Activated => "activated",
            Redundant => "redundant",
        };
        f.write_str(res)
    }
}

#[derive(Debug)]
pub struct Lifecycle {
    worker: u64,
    state: Mutex<WorkerState>,
}

impl Lifecycle {
    pub fn new(worker: u64) -> Self {
        Self {
            worker,
            state: Mutex::new(WorkerState::Installing),
        }
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock()
    }

    /// 切换到下一个状态，返回切换前的状态
    pub fn transition(&self, next: WorkerState) -> Result<WorkerState> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(Error::InvalidTransition { from, to: next });
        }
        *state = next;
        info!("Worker #{} {} -> {}", self.worker, from, next);
        Ok(from)
    }
}
