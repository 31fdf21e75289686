//! 缓存策略
//!
//! 每个策略都是 (配置, 存储, 网络, 请求) 的函数，不持有状态。

use tracing::{debug, warn};

use super::{FetchOutcome, Served, WorkerConfig};
use crate::{
    cache::{CacheEntry, CacheStorage, CachedResponse},
    consts::ROOT_DOCUMENT,
    http::{network::Network, request::FetchRequest},
};

/// 查找缓存，存储错误视为未命中
async fn lookup<S: CacheStorage>(
    storage: &S,
    partition: Option<&str>,
    request: &FetchRequest,
) -> Option<CachedResponse> {
    let found = match partition {
        Some(partition) => storage.match_in(partition, request).await,
        None => storage.match_any(request).await,
    };
    found.unwrap_or_else(|err| {
        warn!("Cache lookup failed for {}: {}", request.uri, err);
        None
    })
}

/// 写入缓存，失败只记录日志
async fn store<S: CacheStorage>(storage: &S, partition: &str, entry: CacheEntry) {
    if let Err(err) = storage.put(partition, entry).await {
        warn!("Failed to store response in {}: {}", partition, err);
    }
}

/// API：网络优先，成功的响应写入 dynamic，网络失败时回退到 dynamic
pub async fn network_first_api<S, N>(
    config: &WorkerConfig,
    storage: &S,
    network: &N,
    request: FetchRequest,
) -> FetchOutcome
where
    S: CacheStorage,
    N: Network,
{
    match network.fetch(&request).await {
        Ok(response) => {
            if response.is_storable() {
                let entry = CacheEntry::new(&request, response.clone());
                store(storage, &config.dynamic_cache, entry).await;
            }
            FetchOutcome::Respond(Served::miss(response))
        }
        Err(err) => {
            debug!("Network failed for {}: {}", request.uri, err);
            match lookup(storage, Some(config.dynamic_cache.as_str()), &request).await {
                Some(cached) => FetchOutcome::Respond(Served::hit(cached)),
                None => FetchOutcome::Unresolved,
            }
        }
    }
}

/// 静态资源：缓存优先，未命中时请求网络并写入 static
///
/// 网络失败不做回退，直接传播给调用方。
pub async fn cache_first<S, N>(
    config: &WorkerConfig,
    storage: &S,
    network: &N,
    request: FetchRequest,
) -> FetchOutcome
where
    S: CacheStorage,
    N: Network,
{
    if let Some(cached) = lookup(storage, None, &request).await {
        debug!("Cache hit {}", request.uri);
        return FetchOutcome::Respond(Served::hit(cached));
    }

    match network.fetch(&request).await {
        Ok(response) => {
            if response.is_storable() {
                let entry = CacheEntry::new(&request, response.clone());
                store(storage, &config.static_cache, entry).await;
            }
            FetchOutcome::Respond(Served::miss(response))
        }
        Err(err) => FetchOutcome::Failed(err),
    }
}

/// 页面：网络优先，HTML 响应在后台写入 dynamic
///
/// 网络失败时依次回退到：dynamic 中的同一请求、根文档（仅导航）、
/// 合成的离线响应（仅导航）。
pub async fn network_first_page<S, N>(
    config: &WorkerConfig,
    storage: &S,
    network: &N,
    request: FetchRequest,
) -> FetchOutcome
where
    S: CacheStorage,
    N: Network,
{
    match network.fetch(&request).await {
        Ok(response) => {
            if response.is_storable() && response.is_html() {
                let entry = CacheEntry::new(&request, response.clone());
                let storage = storage.clone();
                let partition = config.dynamic_cache.clone();
                // 不等待写入完成
                tokio::spawn(async move { store(&storage, &partition, entry).await });
            }
            FetchOutcome::Respond(Served::miss(response))
        }
        Err(err) => {
            debug!("Network failed for {}: {}", request.uri, err);
            let dynamic = Some(config.dynamic_cache.as_str());
            if let Some(cached) = lookup(storage, dynamic, &request).await {
                return FetchOutcome::Respond(Served::hit(cached));
            }
            if !request.is_navigation() {
                return FetchOutcome::Unresolved;
            }

            match request.same_origin_get(ROOT_DOCUMENT) {
                Ok(root) => {
                    if let Some(cached) = lookup(storage, None, &root).await {
                        return FetchOutcome::Respond(Served::hit(cached));
                    }
                }
                Err(err) => warn!("Failed to build root document request: {}", err),
            }
            FetchOutcome::Respond(Served::offline(&config.offline_message))
        }
    }
}
