//! 缓存分区存储
//!
//! 每个分区是一个以请求标识为键、以响应为值的存储。
//! 分区在首次写入时创建，只会在激活阶段整体删除。

use std::fmt::Display;

use axum::{body::Body, body::Bytes, response::Response};
use chrono::{DateTime, Utc};
use http::{
    HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri,
    header::{ACCEPT_ENCODING, CONTENT_TYPE, VARY},
};
use serde::{Deserialize, Serialize};

use crate::{error::Result, http::request::FetchRequest};

pub mod disk;
pub mod memory;
mod storage;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;
pub use storage::Storage;

/// 请求标识：方法 + 绝对地址
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, uri: &Uri) -> Self {
        Self {
            method: method.as_str().to_string(),
            url: uri.to_string(),
        }
    }
}

impl Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// 完整读入内存的响应
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// 响应体超过缓存上限，只转发不缓存
    pub oversized: bool,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            oversized: false,
        }
    }

    pub fn mark_oversized(mut self) -> Self {
        self.oversized = true;
        self
    }

    /// 离线兜底响应：503 + 纯文本
    pub fn offline(message: &str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            headers,
            Bytes::copy_from_slice(message.as_bytes()),
        )
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 是否允许写入缓存
    ///
    /// 只缓存 2xx，排除部分内容、`Vary: *` 和超过上限的响应体。
    pub fn is_storable(&self) -> bool {
        self.is_success()
            && !self.oversized
            && self.status != StatusCode::PARTIAL_CONTENT
            && !self.vary_names().iter().any(|name| name == "*")
    }

    pub fn is_html(&self) -> bool {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("text/html"))
    }

    /// `Vary` 中列出的请求头名称（小写）
    pub fn vary_names(&self) -> Vec<String> {
        self.headers
            .get_all(VARY)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn into_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// 分区中的一条记录
///
/// `vary` 记录了产生该响应的请求在 `Vary` 所列请求头上的取值，
/// 匹配时逐一比较。
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: RequestKey,
    pub vary: Vec<(HeaderName, Option<HeaderValue>)>,
    pub response: CachedResponse,
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(request: &FetchRequest, response: CachedResponse) -> Self {
        let vary = response
            .vary_names()
            .into_iter()
            .filter_map(|name| HeaderName::from_bytes(name.as_bytes()).ok())
            // 存储的响应体总是已解压的，编码协商与匹配无关
            .filter(|name| name != ACCEPT_ENCODING)
            .map(|name| {
                let value = request.headers.get(&name).cloned();
                (name, value)
            })
            .collect();
        Self {
            key: request.key(),
            vary,
            response,
            stored_at: Utc::now(),
        }
    }

    pub fn matches(&self, request: &FetchRequest) -> bool {
        self.key == request.key()
            && self
                .vary
                .iter()
                .all(|(name, value)| request.headers.get(name) == value.as_ref())
    }
}

/// 缓存存储
///
/// 实现需要保证 clone 开销很小，并且所有 clone 指向同一份存储。
/// 对同一个键的读写由实现自身保证原子性，后写覆盖先写。
pub trait CacheStorage: Clone + Send + Sync + 'static {
    /// 写入一条记录，分区不存在时自动创建
    fn put(&self, partition: &str, entry: CacheEntry) -> impl Future<Output = Result<()>> + Send;

    /// 在指定分区中查找请求对应的响应，分区不存在时返回 `None`
    fn match_in(
        &self,
        partition: &str,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Option<CachedResponse>>> + Send;

    /// 列出所有分区名称
    fn keys(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn has(&self, partition: &str) -> impl Future<Output = Result<bool>> + Send;

    /// 删除整个分区，返回分区是否存在
    fn delete(&self, partition: &str) -> impl Future<Output = Result<bool>> + Send;

    /// 按 `keys` 的顺序在所有分区中查找
    fn match_any(
        &self,
        request: &FetchRequest,
    ) -> impl Future<Output = Result<Option<CachedResponse>>> + Send {
        async move {
            for name in self.keys().await? {
                if let Some(response) = self.match_in(&name, request).await? {
                    return Ok(Some(response));
                }
            }
            Ok(None)
        }
    }
}
