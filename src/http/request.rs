use axum::body::Bytes;
use http::{
    HeaderMap, HeaderValue, Method, Uri,
    header::{ACCEPT, HeaderName},
};
use mime_guess::from_path;

use crate::{cache::RequestKey, error::Result};

/// `Sec-Fetch-Dest` 请求头
pub const SEC_FETCH_DEST: HeaderName = HeaderName::from_static("sec-fetch-dest");
/// `Sec-Fetch-Mode` 请求头
pub const SEC_FETCH_MODE: HeaderName = HeaderName::from_static("sec-fetch-mode");

/// 请求目标资源类型
///
/// 优先使用浏览器发送的 `Sec-Fetch-Dest`，缺失时按路径扩展名推断。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Image,
    Style,
    Script,
    Font,
    Empty,
    Other,
}

impl Destination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "style" => Destination::Style,
            "script" => Destination::Script,
            "font" => Destination::Font,
            "empty" => Destination::Empty,
            _ => Destination::Other,
        }
    }

    /// 按扩展名推断资源类型
    pub fn guess(path: &str) -> Self {
        let Some(mime) = from_path(path).first() else {
            return Destination::Empty;
        };
        match (mime.type_().as_str(), mime.essence_str()) {
            ("image", _) => Destination::Image,
            ("font", _) | (_, "application/vnd.ms-fontobject") => Destination::Font,
            (_, "text/css") => Destination::Style,
            (_, "text/javascript") | (_, "application/javascript") => Destination::Script,
            (_, "text/html") => Destination::Document,
            _ => Destination::Other,
        }
    }

    /// 图片、样式、脚本和字体走 cache-first
    pub fn is_static_asset(self) -> bool {
        matches!(
            self,
            Destination::Image | Destination::Style | Destination::Script | Destination::Font
        )
    }
}

/// 请求模式，只关心是否为页面导航
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    NoCors,
    Cors,
    Other,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => RequestMode::Navigate,
            "same-origin" => RequestMode::SameOrigin,
            "no-cors" => RequestMode::NoCors,
            "cors" => RequestMode::Cors,
            _ => RequestMode::Other,
        }
    }
}

/// 被拦截的请求
///
/// `uri` 始终是绝对地址。请求体已经完整读入内存，
/// 因此同一个请求可以同时用于缓存匹配和网络转发。
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl FetchRequest {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let destination = headers
            .get(SEC_FETCH_DEST)
            .and_then(|v| v.to_str().ok())
            .map(Destination::from_header)
            .unwrap_or_else(|| Destination::guess(uri.path()));

        let mode = match headers.get(SEC_FETCH_MODE).and_then(|v| v.to_str().ok()) {
            Some(mode) => RequestMode::from_header(mode),
            // 没有 fetch metadata 的客户端：接受 HTML 的 GET 视为导航
            None if method == Method::GET && accepts_html(&headers) => RequestMode::Navigate,
            None => RequestMode::Other,
        };

        Self {
            method,
            uri,
            headers,
            body,
            destination,
            mode,
        }
    }

    /// 构造一个不带请求头的 GET 请求
    pub fn get(url: &str) -> Result<Self> {
        let uri = Uri::try_from(url)?;
        Ok(Self::new(Method::GET, uri, HeaderMap::new(), Bytes::new()))
    }

    /// 构造一个页面导航请求
    pub fn navigate(url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("navigate"));
        headers.insert(SEC_FETCH_DEST, HeaderValue::from_static("document"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
        let uri = Uri::try_from(url)?;
        Ok(Self::new(Method::GET, uri, headers, Bytes::new()))
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn host(&self) -> Option<&str> {
        self.uri.host()
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.uri)
    }

    /// 同一源下指定路径的 GET 请求，不带原请求的头部和请求体
    ///
    /// 与安装阶段预缓存时使用的请求一致，查找时不会受 `Vary` 影响。
    pub fn same_origin_get(&self, path: &str) -> Result<Self> {
        let mut parts = self.uri.clone().into_parts();
        parts.path_and_query = Some(path.parse()?);
        let uri = Uri::from_parts(parts).map_err(http::Error::from)?;
        Ok(Self::new(Method::GET, uri, HeaderMap::new(), Bytes::new()))
    }
}

fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("text/html"))
}

/// 解析代理目标地址
///
/// 绝对地址（正向代理形式）原样使用，
/// 否则拼接到源站地址之后。
pub fn resolve_target(uri: &Uri, origin: &Uri) -> Result<Uri> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Ok(uri.clone());
    }
    let path_query = uri
        .path_and_query()
        .map(|v| v.as_str())
        .unwrap_or_else(|| uri.path());
    let origin = origin.to_string();
    let target = format!("{}{}", origin.trim_end_matches('/'), path_query);
    Ok(Uri::try_from(target)?)
}
