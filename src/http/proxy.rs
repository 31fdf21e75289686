use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    response::Response,
};
use http::{HeaderValue, Uri};
use tracing::debug;

use super::{
    error::{RouteError, RouteResult},
    network::Network,
    request::{FetchRequest, resolve_target},
};
use crate::{
    cache::CacheStorage,
    consts::X_CACHE,
    worker::{FetchOutcome, Registration},
};

/// 所有监听器共享的代理状态
pub struct ProxyState<S, N> {
    pub registration: Arc<Registration<S, N>>,
    /// 相对地址请求的目标源站
    pub origin: Arc<Uri>,
    pub max_body_size: usize,
}

impl<S, N> Clone for ProxyState<S, N> {
    fn clone(&self) -> Self {
        Self {
            registration: self.registration.clone(),
            origin: self.origin.clone(),
            max_body_size: self.max_body_size,
        }
    }
}

impl<S, N> ProxyState<S, N>
where
    S: CacheStorage,
    N: Network,
{
    pub fn new(registration: Arc<Registration<S, N>>, origin: Uri, max_body_size: usize) -> Self {
        Self {
            registration,
            origin: Arc::new(origin),
            max_body_size,
        }
    }
}

pub fn build_router<S, N>(state: ProxyState<S, N>) -> Router
where
    S: CacheStorage,
    N: Network,
{
    Router::new().fallback(serve::<S, N>).with_state(state)
}

/// 代理入口
///
/// 请求交给当前 worker，不拦截的请求原样转发到网络。
pub async fn serve<S, N>(
    State(state): State<ProxyState<S, N>>,
    req: Request<Body>,
) -> RouteResult<Response>
where
    S: CacheStorage,
    N: Network,
{
    let (parts, body) = req.into_parts();
    let body = to_bytes(body, state.max_body_size).await.map_err(|err| {
        debug!("Failed to read request body: {}", err);
        RouteError::BadRequest()
    })?;
    let target = resolve_target(&parts.uri, &state.origin).map_err(|err| {
        debug!("Invalid request target {}: {}", parts.uri, err);
        RouteError::BadRequest()
    })?;
    let request = FetchRequest::new(parts.method, target, parts.headers, body);

    match state.registration.fetch(request.clone()).await {
        FetchOutcome::Respond(served) => Ok(served.into_response()),
        FetchOutcome::Passthrough(reason) => {
            debug!("Passthrough {} ({:?})", request.uri, reason);
            let response = state.registration.network().fetch(&request).await?;
            let mut res = response.into_response();
            res.headers_mut()
                .insert(X_CACHE, HeaderValue::from_static("pass"));
            Ok(res)
        }
        FetchOutcome::Unresolved => Err(RouteError::Offline()),
        FetchOutcome::Failed(err) => Err(RouteError::Upstream(err)),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode, header::CONTENT_TYPE};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        cache::MemoryStorage,
        testing::{FakeNetwork, worker_config},
    };

    async fn setup(
        manifest: &[&str],
        network: &FakeNetwork,
    ) -> (Router, Arc<Registration<MemoryStorage, FakeNetwork>>) {
        let registration = Arc::new(Registration::new(MemoryStorage::new(), network.clone()));
        if !manifest.is_empty() {
            registration
                .register(worker_config("v1.0.0", manifest))
                .await
                .unwrap();
        }
        let state = ProxyState::new(
            registration.clone(),
            Uri::from_static("http://site.test"),
            1024 * 1024,
        );
        (build_router(state), registration)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn navigate(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("sec-fetch-mode", "navigate")
            .header("sec-fetch-dest", "document")
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(res: Response) -> Value {
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_without_worker_passes_through() {
        let network = FakeNetwork::new();
        network.html("http://site.test/", "<h1>home</h1>");
        let (router, _) = setup(&[], &network).await;

        let res = router.oneshot(get("/")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(X_CACHE).unwrap(), "pass");
    }

    #[tokio::test]
    async fn test_serves_manifest_offline() {
        let network = FakeNetwork::new();
        network.html("http://site.test/", "<h1>home</h1>");
        network.bytes("http://site.test/logo.png", "image/png", b"\x89PNG");
        let (router, _) = setup(&["/", "/logo.png"], &network).await;
        network.set_offline(true);

        let res = router.clone().oneshot(get("/logo.png")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(X_CACHE).unwrap(), "hit");
        assert_eq!(res.headers().get(CONTENT_TYPE).unwrap(), "image/png");

        // 未缓存页面的导航回退到根文档
        let res = router.oneshot(navigate("/blog/new-post")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body, "<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_root() {
        let network = FakeNetwork::new();
        network.bytes("http://site.test/logo.png", "image/png", b"\x89PNG");
        let (router, _) = setup(&["/logo.png"], &network).await;
        network.set_offline(true);

        let res = router.oneshot(navigate("/about")).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.headers().get(X_CACHE).unwrap(), "offline");
        assert_eq!(
            res.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_unresolved_api_is_offline_json() {
        let network = FakeNetwork::new();
        network.html("http://site.test/", "<h1>home</h1>");
        let (router, _) = setup(&["/"], &network).await;
        network.set_offline(true);

        let res = router.oneshot(get("/api/data")).await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(res).await;
        assert_eq!(body["code"], 1003);
    }

    #[tokio::test]
    async fn test_static_asset_failure_is_bad_gateway() {
        let network = FakeNetwork::new();
        network.html("http://site.test/", "<h1>home</h1>");
        let (router, _) = setup(&["/"], &network).await;
        network.set_offline(true);

        let res = router.oneshot(get("/fonts/inter.woff2")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(res).await;
        assert_eq!(body["code"], 1002);
    }

    #[tokio::test]
    async fn test_cms_and_post_pass_through() {
        let network = FakeNetwork::new();
        network.html("http://site.test/", "<h1>home</h1>");
        network.json("https://abc.api.sanity.io/v1/data/query", "[]");
        network.json("http://site.test/api/contact", r#"{"sent":true}"#);
        let (router, registration) = setup(&["/"], &network).await;

        let res = router
            .clone()
            .oneshot(get("https://abc.api.sanity.io/v1/data/query"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(X_CACHE).unwrap(), "pass");

        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/contact")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"a@b.c"}"#))
            .unwrap();
        let res = router.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(X_CACHE).unwrap(), "pass");

        // 不拦截的请求不会写入缓存
        assert_eq!(
            registration.storage().keys().await.unwrap(),
            vec!["static-v1.0.0"]
        );
    }

    #[tokio::test]
    async fn test_oversized_body_is_bad_request() {
        let network = FakeNetwork::new();
        let registration = Arc::new(Registration::new(MemoryStorage::new(), network.clone()));
        let state = ProxyState::new(registration, Uri::from_static("http://site.test"), 4);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/contact")
            .body(Body::from("too large"))
            .unwrap();
        let res = build_router(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
