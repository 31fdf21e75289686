use notify::{EventKind, RecursiveMode, Watcher};
use std::{
    path::Path,
    sync::mpsc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info};

use crate::{config::Settings, error::Result};

const DEBOUNCE: Duration = Duration::from_millis(500);

/// 启动配置文件监听
///
/// 文件变化时重新读取配置，并把读取结果交给 `callback`。
/// 返回一个发送器，用于发送停止信号。
pub fn start_config_watcher(
    config_path: impl AsRef<Path>,
    callback: impl Fn(Result<Settings>) + Send + 'static,
) -> std::result::Result<mpsc::Sender<()>, notify::Error> {
    let (stop_tx, stop_rx) = mpsc::channel();
    let config_path = config_path.as_ref().to_owned();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    watcher.watch(&config_path, RecursiveMode::NonRecursive)?;
    info!("Watching config file: {:?}", config_path);

    std::thread::spawn(move || {
        // 最后一次事件的时间，安静 DEBOUNCE 之后才重新加载
        let mut pending: Option<Instant> = None;

        loop {
            // 检查是否有停止信号
            if stop_rx.try_recv().is_ok() {
                info!("Stopping config watcher");
                break;
            }

            // 等待事件，带超时
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(event)) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        continue;
                    }
                    debug!("Config file event: {:?}", event);

                    // 文件被删除或重命名（编辑器原子保存）后需要重新 watch
                    if let EventKind::Remove(_)
                    | EventKind::Modify(notify::event::ModifyKind::Name(_)) = event.kind
                    {
                        if let Err(e) = watcher.unwatch(&config_path) {
                            error!("Failed to unwatch config file (ignored): {:?}", e);
                        }
                        if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                            error!("Failed to re-watch config file: {:?}", e);
                        } else {
                            info!("Re-watching config file: {:?}", config_path);
                        }
                    }
                    pending = Some(Instant::now());
                }
                Ok(Err(e)) => error!("Watch error: {:?}", e),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watcher channel disconnected");
                    break;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            if pending.is_some_and(|at| at.elapsed() >= DEBOUNCE) {
                pending = None;
                info!("Config file changed: {:?}", config_path);
                callback(Settings::new(&config_path.to_string_lossy()));
            }
        }

        if let Err(e) = watcher.unwatch(&config_path) {
            error!("Failed to unwatch config file: {:?}", e);
        }
    });

    Ok(stop_tx)
}
