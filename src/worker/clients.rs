use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use super::ServiceWorker;

/// 当前控制所有监听器的 worker
///
/// 所有 clone 共享同一个槽位，claim 之后新的请求立即路由到新 worker。
pub struct Clients<S, N> {
    controller: Arc<RwLock<Option<Arc<ServiceWorker<S, N>>>>>,
}

impl<S, N> Clients<S, N> {
    pub fn new() -> Self {
        Self {
            controller: Arc::new(RwLock::new(None)),
        }
    }

    pub fn controller(&self) -> Option<Arc<ServiceWorker<S, N>>> {
        self.controller.read().clone()
    }

    /// 接管控制权，被取代的 worker 进入 redundant
    pub fn claim(&self, worker: Arc<ServiceWorker<S, N>>) -> Option<Arc<ServiceWorker<S, N>>> {
        let id = worker.id;
        let previous = self.controller.write().replace(worker);
        match previous {
            Some(previous) if previous.id != id => {
                if let Err(err) = previous.lifecycle.transition(super::WorkerState::Redundant) {
                    warn!("Failed to retire worker #{}: {}", previous.id, err);
                }
                info!("Worker #{} claimed clients from worker #{}", id, previous.id);
                Some(previous)
            }
            Some(_) => None,
            None => {
                info!("Worker #{} claimed clients", id);
                None
            }
        }
    }
}

impl<S, N> Default for Clients<S, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, N> Clone for Clients<S, N> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
        }
    }
}
