use futures::future::try_join_all;
use http::Uri;
use tracing::{error, info, warn};

use super::{ServiceWorker, WorkerState};
use crate::{
    cache::{CacheEntry, CacheStorage},
    error::{Error, Result},
    http::{
        network::Network,
        request::{FetchRequest, resolve_target},
    },
};

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStorage,
    N: Network,
{
    /// 预缓存 manifest
    ///
    /// 先并发拉取全部条目，全部成功后才写入 static 分区；
    /// 任意一条失败，worker 进入 redundant，static 分区保持原样。
    pub(super) async fn install(&self) -> Result<()> {
        info!(
            "Worker #{} installing {} ({} manifest entries)",
            self.id,
            self.config.version,
            self.config.manifest.len()
        );

        let result = match self.precache().await {
            Ok(entries) => self.commit(entries).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            error!("Worker #{} install failed: {}", self.id, err);
            self.lifecycle.transition(WorkerState::Redundant)?;
            return Err(err);
        }

        self.lifecycle.transition(WorkerState::Installed)?;
        info!("Worker #{} installed, skip waiting", self.id);
        Ok(())
    }

    async fn precache(&self) -> Result<Vec<CacheEntry>> {
        let fetches = self.config.manifest.iter().map(|path| async move {
            let install_failed = |reason: String| Error::InstallFailed {
                url: path.clone(),
                reason,
            };

            let uri = resolve_target(&Uri::try_from(path.as_str())?, &self.config.origin)?;
            let request = FetchRequest::get(&uri.to_string())?;
            let response = self
                .network
                .fetch(&request)
                .await
                .map_err(|err| install_failed(err.to_string()))?;
            if !response.is_storable() {
                return Err(install_failed(format!("bad status {}", response.status)));
            }
            Ok(CacheEntry::new(&request, response))
        });
        try_join_all(fetches).await
    }

    async fn commit(&self, entries: Vec<CacheEntry>) -> Result<()> {
        let partition = &self.config.static_cache;
        let existed = self.storage.has(partition).await?;
        for entry in entries {
            if let Err(err) = self.storage.put(partition, entry).await {
                // 本次安装新建的分区不保留半成品
                if !existed && let Err(err) = self.storage.delete(partition).await {
                    warn!("Failed to discard partial cache {}: {}", partition, err);
                }
                return Err(err);
            }
        }
        Ok(())
    }
}
