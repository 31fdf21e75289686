use std::time::Duration;

use axum::body::Bytes;
use futures::StreamExt;
use http::{HeaderMap, HeaderName, header::ACCEPT_ENCODING};
use reqwest::{Client, redirect::Policy};
use tracing::debug;

use crate::{cache::CachedResponse, error::Result, http::request::FetchRequest};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("network unreachable: {0}")]
    Unreachable(String),
}

/// 出站网络
///
/// 网络失败（连接失败、超时、响应体读取失败）返回 `Err`，
/// 任何 HTTP 状态码都是成功的 fetch。
pub trait Network: Clone + Send + Sync + 'static {
    fn fetch(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<CachedResponse, FetchError>> + Send;
}

/// 基于 reqwest 的网络实现，内部连接池在所有 clone 之间共享
#[derive(Clone, Debug)]
pub struct HttpNetwork {
    client: Client,
    max_body_size: usize,
}

impl HttpNetwork {
    pub fn new(timeout: Option<Duration>, max_body_size: usize) -> Result<Self> {
        // 重定向交给浏览器处理，保证相对地址和缓存键一致
        let mut builder = Client::builder().redirect(Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(FetchError::from)?;
        Ok(Self {
            client,
            max_body_size,
        })
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, FetchError> {
        let mut forward_req = self
            .client
            .request(request.method.clone(), request.uri.to_string());
        // 编码协商交给 reqwest，缓存中保存的始终是解压后的响应体
        for (name, value) in request.headers.iter() {
            if !is_exclude_header(name) && name != ACCEPT_ENCODING {
                forward_req = forward_req.header(name.clone(), value.clone());
            }
        }
        if !request.body.is_empty() {
            forward_req = forward_req.body(request.body.clone());
        }

        let response = forward_req.send().await.map_err(|err| {
            if err.is_connect() {
                FetchError::Unreachable(err.to_string())
            } else {
                FetchError::Transport(err)
            }
        })?;
        let status = response.status();
        let mut headers = HeaderMap::new();
        copy_headers(response.headers(), &mut headers);

        // 超过上限的响应体照常读完并返回，只是不能写入缓存
        let mut oversized = response
            .content_length()
            .is_some_and(|len| len > self.max_body_size as u64);
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk?);
        }
        if body.len() > self.max_body_size {
            oversized = true;
        }

        debug!("Fetched {} {} -> {}", request.method, request.uri, status);
        let response = CachedResponse::new(status, headers, Bytes::from(body));
        if oversized {
            debug!(
                "Response of {} exceeds {} bytes, not cacheable",
                request.uri, self.max_body_size
            );
            return Ok(response.mark_oversized());
        }
        Ok(response)
    }
}

/// 检查给定的头部是否应该在代理中被排除转发
///
/// 逐跳头部只对单个连接有效，转发会导致冲突。
pub fn is_exclude_header(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "proxy-authenticate"
            | "upgrade"
            | "proxy-authorization"
            | "keep-alive"
            | "transfer-encoding"
            | "te"
    )
}

/// 复制 HTTP 头部，排除逐跳头部
pub fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if !is_exclude_header(name) {
            to.append(name.clone(), value.clone());
        }
    }
}
