use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use super::{
    Clients, EventOutcome, FetchOutcome, PassReason, ServiceWorker, WorkerConfig, WorkerEvent,
};
use crate::{
    cache::CacheStorage,
    error::{Error, Result},
    http::{network::Network, request::FetchRequest},
};

/// 更新通知，由宿主决定如何提示用户
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    Installing {
        worker: u64,
        version: String,
    },
    InstallFailed {
        worker: u64,
        version: String,
        reason: String,
    },
    Activated {
        worker: u64,
        version: String,
        deleted: Vec<String>,
    },
    Redundant {
        worker: u64,
        version: String,
    },
}

const EVENT_CAPACITY: usize = 16;

/// 持有当前 worker，负责注册和更新
///
/// 注册过程串行执行，两次配置变更不会交错安装。
pub struct Registration<S, N> {
    storage: S,
    network: N,
    clients: Clients<S, N>,
    update_lock: Mutex<()>,
    events: broadcast::Sender<UpdateEvent>,
}

impl<S, N> Registration<S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(storage: S, network: N) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            storage,
            network,
            clients: Clients::new(),
            update_lock: Mutex::new(()),
            events,
        }
    }

    /// 安装并激活新的 worker
    ///
    /// 安装失败时返回错误，原来的 worker 继续处理请求。
    pub async fn register(&self, config: WorkerConfig) -> Result<Arc<ServiceWorker<S, N>>> {
        let _guard = self.update_lock.lock().await;

        let worker = Arc::new(ServiceWorker::new(
            config,
            self.storage.clone(),
            self.network.clone(),
            self.clients.clone(),
        ));
        let version = worker.config().version.clone();
        self.emit(UpdateEvent::Installing {
            worker: worker.id(),
            version: version.clone(),
        });

        if let Err(err) = worker.handle(WorkerEvent::Install).await {
            self.emit(UpdateEvent::InstallFailed {
                worker: worker.id(),
                version,
                reason: err.to_string(),
            });
            return Err(err);
        }

        // 安装总是发出 skip-waiting，直接激活
        let previous = self.clients.controller();
        let deleted = match worker.handle(WorkerEvent::Activate).await? {
            EventOutcome::Activated { deleted } => deleted,
            other => {
                return Err(Error::Any(anyhow::anyhow!(
                    "unexpected activation outcome {other:?}"
                )));
            }
        };
        self.emit(UpdateEvent::Activated {
            worker: worker.id(),
            version,
            deleted,
        });
        if let Some(previous) = previous {
            self.emit(UpdateEvent::Redundant {
                worker: previous.id(),
                version: previous.config().version.clone(),
            });
        }
        Ok(worker)
    }

    /// 交给当前 worker 处理，没有 worker 时不拦截
    pub async fn fetch(&self, request: FetchRequest) -> FetchOutcome {
        match self.clients.controller() {
            Some(worker) => worker.fetch(request).await,
            None => FetchOutcome::Passthrough(PassReason::Uncontrolled),
        }
    }

    pub fn active(&self) -> Option<Arc<ServiceWorker<S, N>>> {
        self.clients.controller()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.events.subscribe()
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn emit(&self, event: UpdateEvent) {
        // 没有订阅者时发送失败，忽略即可
        if self.events.send(event.clone()).is_err() {
            debug!("No subscriber for {:?}", event);
        }
    }
}

/// 把更新通知写入日志，直到通道关闭
pub async fn log_update_events(mut events: broadcast::Receiver<UpdateEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => info!("Update event {}", json),
                Err(_) => info!("Update event {:?}", event),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                info!("Update event listener lagged, skipped {}", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
