use http::Method;

use super::WorkerConfig;
use crate::http::request::FetchRequest;

/// 不拦截的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// 目标是 CMS 主机
    CmsHost,
    /// 非 GET 请求
    NonGet,
    /// 还没有激活的 worker
    Uncontrolled,
}

/// 请求分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Passthrough(PassReason),
    NetworkFirstApi,
    CacheFirst,
    NetworkFirstPage,
}

/// 按顺序匹配，第一条命中的规则生效
///
/// 1. 目标主机包含 CMS 主机子串
/// 2. 非 GET
/// 3. 路径以 API 前缀开头
/// 4. 图片、样式、脚本、字体
/// 5. 其它
pub fn classify(config: &WorkerConfig, request: &FetchRequest) -> Route {
    let is_cms = config
        .cms_host
        .as_deref()
        .filter(|cms| !cms.is_empty())
        .is_some_and(|cms| request.host().is_some_and(|host| host.contains(cms)));
    if is_cms {
        return Route::Passthrough(PassReason::CmsHost);
    }
    if request.method != Method::GET {
        return Route::Passthrough(PassReason::NonGet);
    }
    if request.path().starts_with(&config.api_prefix) {
        return Route::NetworkFirstApi;
    }
    if request.destination.is_static_asset() {
        return Route::CacheFirst;
    }
    Route::NetworkFirstPage
}
