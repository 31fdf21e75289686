//! 单元测试使用的内存网络

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use axum::body::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, HeaderValue, StatusCode, Uri, header::CONTENT_TYPE};

use crate::{
    cache::CachedResponse,
    http::{
        network::{FetchError, Network},
        request::FetchRequest,
    },
    worker::WorkerConfig,
};

#[derive(Default)]
struct Inner {
    routes: DashMap<String, CachedResponse>,
    calls: DashMap<String, usize>,
    total: AtomicUsize,
    offline: AtomicBool,
}

/// 按完整 URL 返回预设响应，未知 URL 返回 404
#[derive(Clone, Default)]
pub struct FakeNetwork {
    inner: Arc<Inner>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    pub fn respond(&self, url: &str, response: CachedResponse) {
        self.inner.routes.insert(url.to_string(), response);
    }

    pub fn bytes(&self, url: &str, content_type: &'static str, body: &[u8]) {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        self.respond(
            url,
            CachedResponse::new(StatusCode::OK, headers, Bytes::copy_from_slice(body)),
        );
    }

    pub fn html(&self, url: &str, body: &str) {
        self.bytes(url, "text/html; charset=utf-8", body.as_bytes());
    }

    pub fn json(&self, url: &str, body: &str) {
        self.bytes(url, "application/json", body.as_bytes());
    }

    pub fn status(&self, url: &str, status: StatusCode) {
        self.respond(url, CachedResponse::new(status, HeaderMap::new(), ""));
    }

    /// 指定 URL 的请求次数，包括离线时失败的请求
    pub fn calls(&self, url: &str) -> usize {
        self.inner.calls.get(url).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.inner.total.load(Ordering::SeqCst)
    }
}

impl Network for FakeNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let url = request.uri.to_string();
        *self.inner.calls.entry(url.clone()).or_insert(0) += 1;
        self.inner.total.fetch_add(1, Ordering::SeqCst);

        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Unreachable(url));
        }
        let response = self
            .inner
            .routes
            .get(&url)
            .map(|r| r.clone())
            .unwrap_or_else(|| CachedResponse::new(StatusCode::NOT_FOUND, HeaderMap::new(), ""));
        Ok(response)
    }
}

pub fn worker_config(version: &str, manifest: &[&str]) -> WorkerConfig {
    WorkerConfig {
        version: version.to_string(),
        static_cache: format!("static-{version}"),
        dynamic_cache: format!("dynamic-{version}"),
        manifest: manifest.iter().map(|s| s.to_string()).collect(),
        cms_host: Some("sanity.io".to_string()),
        api_prefix: "/api/".to_string(),
        offline_message: "You are offline. Please check your connection.".to_string(),
        origin: Uri::from_static("http://site.test"),
    }
}
