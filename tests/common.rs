//! 集成测试的公共辅助函数和工具
#![allow(dead_code)]

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    http::header::CONTENT_TYPE,
    response::Html,
    routing::{get, post},
};
use axum_server::Handle;
use serde_json::{Value, json};
use tempfile::TempDir;

use larder::{
    cache::Storage,
    config::Settings,
    http::{make_server, network::HttpNetwork, proxy::ProxyState},
    worker::{Registration, WorkerConfig},
};

pub const HOME: &str = "<html><body><h1>home</h1></body></html>";
pub const BLOG: &str = "<html><body><h1>blog</h1></body></html>";
pub const LOGO: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
pub const OFFLINE: &str = "You are offline. Please check your connection.";

/// 模拟源站
pub struct Origin {
    pub addr: SocketAddr,
    handle: Handle<SocketAddr>,
}

impl Origin {
    pub async fn start() -> Result<Self> {
        let router = Router::new()
            .route("/", get(|| async { Html(HOME) }))
            .route("/blog", get(|| async { Html(BLOG) }))
            .route("/logo.png", get(|| async { ([(CONTENT_TYPE, "image/png")], LOGO) }))
            .route(
                "/manifest.json",
                get(|| async { Json(json!({ "name": "site" })) }),
            )
            .route(
                "/api/data",
                get(|| async { Json(json!({ "posts": ["hello", "world"] })) }),
            )
            .route(
                "/api/contact",
                post(|body: Bytes| async move {
                    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
                    Json(json!({ "received": body }))
                }),
            );

        let handle = Handle::new();
        let server = axum_server::bind("127.0.0.1:0".parse()?).handle(handle.clone());
        tokio::spawn(async move {
            let _ = server.serve(router.into_make_service()).await;
        });
        let addr = handle
            .listening()
            .await
            .context("origin failed to listen")?;
        Ok(Self { addr, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// 关闭源站，模拟网络不可用
    pub async fn stop(&self) {
        self.handle.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// 测试代理配置
pub struct TestProxyConfig {
    pub version: String,
    pub manifest: Vec<String>,
    pub storage: StorageChoice,
}

pub enum StorageChoice {
    Memory,
    Disk(PathBuf),
}

impl Default for TestProxyConfig {
    fn default() -> Self {
        Self {
            version: "v1.0.0".to_string(),
            manifest: vec!["/".to_string(), "/logo.png".to_string()],
            storage: StorageChoice::Memory,
        }
    }
}

/// 创建临时配置文件用于测试
pub fn create_temp_config(dir: &TempDir, origin: &str, config: &TestProxyConfig) -> Result<PathBuf> {
    let config_path = dir.path().join("config.toml");

    let mut content = String::new();
    content.push_str("log_level = \"debug\"\n");
    content.push_str(&format!("origin = \"{origin}\"\n"));
    content.push_str("fetch_timeout = 5\n");

    content.push_str("[cache]\n");
    content.push_str(&format!("version = \"{}\"\n", config.version));
    content.push_str(&format!("manifest = {:?}\n", config.manifest));
    content.push_str("cms_host = \"sanity.io\"\n");

    if let StorageChoice::Disk(path) = &config.storage {
        content.push_str("[storage]\n");
        content.push_str("kind = \"disk\"\n");
        content.push_str(&format!("path = {:?}\n", path.to_string_lossy()));
    }

    content.push_str("[[host]]\n");
    content.push_str("ip = \"127.0.0.1\"\n");
    content.push_str("port = 0\n");
    content.push_str("timeout = 10\n");

    std::fs::write(&config_path, content)?;
    Ok(config_path)
}

pub struct TestProxy {
    pub addr: SocketAddr,
    pub settings: Settings,
    pub registration: Arc<Registration<Storage, HttpNetwork>>,
    pub handle: Handle<SocketAddr>,
    _dir: TempDir,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// 用新版本号重新注册
    pub async fn update(&self, version: &str) -> larder::error::Result<()> {
        let mut settings = self.settings.clone();
        settings.cache.version = version.to_string();
        let config = WorkerConfig::from_settings(&settings)?;
        self.registration.register(config).await?;
        Ok(())
    }

    pub async fn stop(&self) {
        self.handle.graceful_shutdown(Some(Duration::from_secs(1)));
    }
}

/// 启动代理，返回代理和首次注册的结果
pub async fn start_proxy(
    origin: &str,
    config: &TestProxyConfig,
) -> Result<(TestProxy, larder::error::Result<()>)> {
    let dir = TempDir::new()?;
    let config_path = create_temp_config(&dir, origin, config)?;
    let settings = Settings::new(config_path.to_str().context("invalid path")?)?;

    let storage = Storage::from_settings(&settings.storage);
    let network = HttpNetwork::new(
        settings.fetch_timeout.map(Duration::from_secs),
        settings.max_body_size,
    )?;
    let registration = Arc::new(Registration::new(storage, network));
    let installed = match WorkerConfig::from_settings(&settings) {
        Ok(worker) => registration.register(worker).await.map(|_| ()),
        Err(e) => Err(e),
    };

    let state = ProxyState::new(
        registration.clone(),
        settings.origin_uri()?,
        settings.max_body_size,
    );
    let handle = make_server(settings.host[0].clone(), state).await?;
    let addr = handle
        .listening()
        .await
        .context("proxy failed to listen")?;

    let proxy = TestProxy {
        addr,
        settings,
        registration,
        handle,
        _dir: dir,
    };
    Ok((proxy, installed))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build client")
}

/// 浏览器发出的页面导航请求
pub fn navigate(client: &reqwest::Client, url: &str) -> reqwest::RequestBuilder {
    client
        .get(url)
        .header("sec-fetch-mode", "navigate")
        .header("sec-fetch-dest", "document")
        .header("accept", "text/html")
}

pub fn x_cache(res: &reqwest::Response) -> String {
    res.headers()
        .get("x-cache")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
