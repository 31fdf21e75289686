//! 版本化的缓存策略实例
//!
//! 一个 `ServiceWorker` 对应一份配置（一个版本号）。
//! 生命周期事件和请求都通过 [`ServiceWorker::handle`] 分发。

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use axum::{body::Body, response::Response};
use http::{HeaderValue, Uri};
use tracing::debug;

use crate::{
    cache::{CacheStorage, CachedResponse},
    config::Settings,
    consts::X_CACHE,
    error::Result,
    http::{
        network::{FetchError, Network},
        request::FetchRequest,
    },
};

mod activate;
mod clients;
mod install;
pub mod lifecycle;
mod registration;
pub mod router;
pub mod strategy;

pub use clients::Clients;
pub use lifecycle::WorkerState;
pub use registration::{Registration, UpdateEvent, log_update_events};
pub use router::{PassReason, Route};

static WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// 不可变的策略配置，在 worker 的整个生命周期内共享
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: String,
    /// 当前版本的 static 分区名
    pub static_cache: String,
    /// 当前版本的 dynamic 分区名
    pub dynamic_cache: String,
    pub manifest: Vec<String>,
    pub cms_host: Option<String>,
    pub api_prefix: String,
    pub offline_message: String,
    /// 相对地址解析的基准
    pub origin: Uri,
}

impl WorkerConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let cache = &settings.cache;
        Ok(Self {
            version: cache.version.clone(),
            static_cache: cache.static_cache_name(),
            dynamic_cache: cache.dynamic_cache_name(),
            manifest: cache.manifest.clone(),
            cms_host: cache.cms_host.clone(),
            api_prefix: cache.api_prefix.clone(),
            offline_message: cache.offline_message.clone(),
            origin: settings.origin_uri()?,
        })
    }

    /// 分区是否属于当前版本
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }
}

#[derive(Debug)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
}

#[derive(Debug)]
pub enum EventOutcome {
    /// 安装成功，并且已经发出 skip-waiting 信号
    Installed,
    /// 激活完成，附带被清理的旧分区
    Activated { deleted: Vec<String> },
    Fetched(FetchOutcome),
}

/// 响应来源，写入 `X-Cache` 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Hit,
    Miss,
    /// 合成的离线响应
    Offline,
}

impl CacheSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheSource::Hit => "hit",
            CacheSource::Miss => "miss",
            CacheSource::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub response: CachedResponse,
    pub source: CacheSource,
}

impl Served {
    pub fn hit(response: CachedResponse) -> Self {
        Self {
            response,
            source: CacheSource::Hit,
        }
    }

    pub fn miss(response: CachedResponse) -> Self {
        Self {
            response,
            source: CacheSource::Miss,
        }
    }

    pub fn offline(message: &str) -> Self {
        Self {
            response: CachedResponse::offline(message),
            source: CacheSource::Offline,
        }
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = self.response.into_response();
        response
            .headers_mut()
            .insert(X_CACHE, HeaderValue::from_static(self.source.as_str()));
        response
    }
}

/// 单个请求的处理结果
#[derive(Debug)]
pub enum FetchOutcome {
    /// 不拦截，交给网络原样处理
    Passthrough(PassReason),
    Respond(Served),
    /// 网络失败且没有缓存，策略没有给出响应
    Unresolved,
    /// 网络失败直接向调用方传播
    Failed(FetchError),
}

pub struct ServiceWorker<S, N> {
    id: u64,
    config: Arc<WorkerConfig>,
    storage: S,
    network: N,
    lifecycle: lifecycle::Lifecycle,
    clients: Clients<S, N>,
}

impl<S, N> ServiceWorker<S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(config: WorkerConfig, storage: S, network: N, clients: Clients<S, N>) -> Self {
        let id = WORKER_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id,
            config: Arc::new(config),
            storage,
            network,
            lifecycle: lifecycle::Lifecycle::new(id),
            clients,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn state(&self) -> WorkerState {
        self.lifecycle.state()
    }

    /// 事件分发入口
    pub async fn handle(self: &Arc<Self>, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => {
                self.install().await?;
                Ok(EventOutcome::Installed)
            }
            WorkerEvent::Activate => {
                let deleted = self.activate().await?;
                Ok(EventOutcome::Activated { deleted })
            }
            WorkerEvent::Fetch(request) => Ok(EventOutcome::Fetched(self.fetch(request).await)),
        }
    }

    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        let route = router::classify(&self.config, &request);
        debug!(
            "Worker #{} {} {} -> {:?}",
            self.id, request.method, request.uri, route
        );
        match route {
            Route::Passthrough(reason) => FetchOutcome::Passthrough(reason),
            Route::NetworkFirstApi => {
                strategy::network_first_api(&self.config, &self.storage, &self.network, request)
                    .await
            }
            Route::CacheFirst => {
                strategy::cache_first(&self.config, &self.storage, &self.network, request).await
            }
            Route::NetworkFirstPage => {
                strategy::network_first_page(&self.config, &self.storage, &self.network, request)
                    .await
            }
        }
    }
}

impl<S, N> std::fmt::Debug for ServiceWorker<S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.config.version)
            .field("state", &self.lifecycle.state())
            .finish()
    }
}
