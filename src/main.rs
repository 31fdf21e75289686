use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use larder::{
    cache::Storage,
    cli::Cli,
    config::Settings,
    consts::{ARCH, COMMIT, COMPILER, NAME, OS, VERSION},
    http::{
        ServerHandles, handle_config_change, network::HttpNetwork, proxy::ProxyState,
        start_servers,
    },
    utils::{init_logger, shutdown_application, start_config_watcher},
    worker::{Registration, WorkerConfig, log_update_events},
};

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = Settings::new(&args.config).with_context(|| "init config failed")?;

    let _guard = init_logger(settings.log_level.as_str(), settings.log_folder.as_str())
        .with_context(|| "init logger failed")?;

    debug!("settings {:?}", settings);
    info!("{}/{} {}", NAME, VERSION, COMMIT);
    info!("{}", COMPILER);
    info!("OS: {} {}", OS, ARCH);
    for warning in settings.warnings() {
        warn!("{}", warning);
    }

    let storage = Storage::from_settings(&settings.storage);
    let network = HttpNetwork::new(
        settings.fetch_timeout.map(Duration::from_secs),
        settings.max_body_size,
    )
    .with_context(|| "init http client failed")?;
    let registration = Arc::new(Registration::new(storage, network));
    tokio::spawn(log_update_events(registration.subscribe()));

    // 安装失败时不拦截请求，等待下一次配置变更
    let config = WorkerConfig::from_settings(&settings)?;
    if let Err(e) = registration.register(config).await {
        error!("Initial install failed, serving without cache: {}", e);
    }

    let state = ProxyState::new(
        registration,
        settings.origin_uri()?,
        settings.max_body_size,
    );
    let handles: ServerHandles = Arc::new(Mutex::new(
        start_servers(settings.host.clone(), state.clone()).await,
    ));

    // 启动配置文件监听
    let runtime = tokio::runtime::Handle::current();
    let watcher_handles = handles.clone();
    let current = settings.clone();
    let stop_tx = start_config_watcher(&args.config, move |result| {
        let handles = watcher_handles.clone();
        let state = state.clone();
        let current = current.clone();
        runtime.spawn(async move {
            handle_config_change(result, &current, handles, state).await;
        });
    })
    .with_context(|| "init config watcher failed")?;

    tokio::signal::ctrl_c()
        .await
        .with_context(|| "wait for shutdown signal failed")?;
    shutdown_application(handles, stop_tx).await;
    Ok(())
}
