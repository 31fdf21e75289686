use std::sync::mpsc;

use tracing::{error, info};

use crate::http::{ServerHandles, shutdown_servers};

/// 优雅关闭服务器和配置监听器
pub async fn shutdown_application(handles: ServerHandles, stop_tx: mpsc::Sender<()>) {
    info!("Received shutdown signal, closing servers...");

    // 优雅关闭所有服务器
    let mut current_handles = handles.lock().await;
    shutdown_servers(&mut current_handles).await;

    // 停止配置监听
    if let Err(err) = stop_tx.send(()) {
        error!("Failed to send stop signal to config watcher: {:?}", err);
    }

    info!("Application shutdown complete");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum_server::Handle;
    use tokio::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn test_shutdown_application() {
        let handles: ServerHandles = Arc::new(Mutex::new(vec![Handle::new(), Handle::new()]));
        let (stop_tx, stop_rx) = mpsc::channel();

        shutdown_application(handles.clone(), stop_tx).await;

        assert!(handles.lock().await.is_empty());
        assert!(stop_rx.try_recv().is_ok());
    }
}
