use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::middleware;
use axum_server::{Handle, tls_rustls::RustlsConfig};
use http::StatusCode;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, error, info, warn};

use crate::{
    cache::CacheStorage,
    config::{SettingHost, Settings},
    middlewares::{add_version, logging_route},
    worker::WorkerConfig,
};

pub mod error;
// 出站网络
pub mod network;
// 处理代理请求
pub mod proxy;
pub mod request;

use network::Network;
use proxy::{ProxyState, build_router};

/// 运行中的监听器句柄
pub type ServerHandles = Arc<Mutex<Vec<Handle<SocketAddr>>>>;

/// 处理配置文件变更的回调函数
///
/// 先用新配置注册 worker，再重启监听器。
/// 注册失败时旧 worker 继续处理请求。
pub async fn handle_config_change<S, N>(
    result: crate::error::Result<Settings>,
    current: &Settings,
    handles: ServerHandles,
    state: ProxyState<S, N>,
) where
    S: CacheStorage,
    N: Network,
{
    let new_settings = match result {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to reload config file: {:?}", e);
            return;
        }
    };
    info!("Config file reloaded successfully");

    for field in current.restart_required(&new_settings) {
        warn!("Config field `{}` changed, restart to apply it", field);
    }
    for warning in new_settings.warnings() {
        warn!("{}", warning);
    }

    match WorkerConfig::from_settings(&new_settings) {
        Ok(config) => {
            if let Err(e) = state.registration.register(config).await {
                error!("Failed to update worker, keep serving previous one: {}", e);
            }
        }
        Err(e) => error!("Invalid worker config: {}", e),
    }

    info!("Config file changed, restarting servers to apply new config...");
    let mut current_handles = handles.lock().await;
    shutdown_servers(&mut current_handles).await;
    *current_handles = start_servers(new_settings.host, state).await;
    info!("All servers have been restarted successfully");
}

/// 优雅关闭所有服务器
///
/// 服务器将在 30 秒内完成正在处理的请求后停止。
pub async fn shutdown_servers(handles: &mut Vec<Handle<SocketAddr>>) {
    for handle in handles.iter() {
        handle.graceful_shutdown(Some(Duration::from_secs(30)));
    }
    handles.clear();
    info!("All servers have been signaled to shut down");
}

/// 启动所有服务器
///
/// 单个服务器启动失败只记录错误日志，不影响其他服务器。
pub async fn start_servers<S, N>(
    hosts: Vec<SettingHost>,
    state: ProxyState<S, N>,
) -> Vec<Handle<SocketAddr>>
where
    S: CacheStorage,
    N: Network,
{
    let mut handles = Vec::new();
    for host in hosts {
        // 保存主机地址信息用于日志显示
        let server_addr = format!("{}:{}", host.ip, host.port);
        match make_server(host, state.clone()).await {
            Ok(handle) => {
                handles.push(handle);
                info!("Server instance started on {}", server_addr);
            }
            Err(e) => {
                error!(
                    "Failed to start server instance on {}: {:?}",
                    server_addr, e
                );
            }
        }
    }
    handles
}

pub async fn make_server<S, N>(
    host: SettingHost,
    state: ProxyState<S, N>,
) -> anyhow::Result<Handle<SocketAddr>>
where
    S: CacheStorage,
    N: Network,
{
    let mut router = build_router(state);
    router = router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(add_version))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::SERVICE_UNAVAILABLE,
                Duration::from_secs(host.timeout.into()),
            )),
    );
    router = logging_route(router);

    let addr = format!("{}:{}", host.ip, host.port);
    let addr: SocketAddr = addr.parse()?;

    let handle = Handle::new();
    let handle_clone = handle.clone();

    // 生成一个任务来运行服务器
    tokio::spawn(async move {
        let result = match (host.ssl, host.certificate, host.certificate_key) {
            (true, Some(cert), Some(key)) => {
                debug!("Certificate: {} Certificate key: {}", cert, key);
                match RustlsConfig::from_pem_file(&cert, &key).await {
                    Ok(rustls_config) => {
                        info!("Listening on https://{}", addr);
                        axum_server::bind_rustls(addr, rustls_config)
                            .handle(handle_clone)
                            .serve(router.into_make_service())
                            .await
                            .map_err(anyhow::Error::from)
                    }
                    Err(e) => Err(anyhow::Error::from(e)),
                }
            }
            (true, _, _) => Err(anyhow!("SSL enabled but certificate or key missing")),
            (false, _, _) => {
                info!("Listening on http://{}", addr);
                axum_server::bind(addr)
                    .handle(handle_clone)
                    .serve(router.into_make_service())
                    .await
                    .map_err(anyhow::Error::from)
            }
        };
        if let Err(e) = result {
            error!("Server on {} stopped: {:?}", addr, e);
        }
    });

    Ok(handle)
}
