use std::sync::Arc;

use tracing::{info, warn};

use super::{ServiceWorker, WorkerState};
use crate::{cache::CacheStorage, error::Result, http::network::Network};

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStorage,
    N: Network,
{
    /// 清理旧版本分区并接管请求，返回被删除的分区
    pub(super) async fn activate(self: &Arc<Self>) -> Result<Vec<String>> {
        self.lifecycle.transition(WorkerState::Activating)?;
        let deleted = self.collect_garbage().await;
        self.clients.claim(self.clone());
        self.lifecycle.transition(WorkerState::Activated)?;
        Ok(deleted)
    }

    /// 删除所有不属于当前版本的分区
    ///
    /// 尽力而为：单个分区删除失败只记录日志，不中断。
    pub async fn collect_garbage(&self) -> Vec<String> {
        let names = match self.storage.keys().await {
            Ok(names) => names,
            Err(err) => {
                warn!("Failed to list cache partitions: {}", err);
                return vec![];
            }
        };

        let mut deleted = vec![];
        for name in names {
            if self.config.is_current(&name) {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(true) => {
                    info!("Deleted stale cache partition {}", name);
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(err) => warn!("Failed to delete cache partition {}: {}", name, err),
            }
        }
        deleted
    }
}
